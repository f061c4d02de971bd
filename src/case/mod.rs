use serde_json::{Map, Value};

/// Convert snake_case to camelCase.
///
/// Only an underscore directly followed by an ASCII lowercase letter is
/// rewritten; every other character is kept as-is.
pub fn snake_to_camel(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        match chars.get(i + 1) {
            Some(next) if ch == '_' && next.is_ascii_lowercase() => {
                result.push(next.to_ascii_uppercase());
                i += 2;
            }
            _ => {
                result.push(ch);
                i += 1;
            }
        }
    }
    result
}

/// Convert camelCase to snake_case, one uppercase letter at a time.
///
/// Acronyms fragment: `APIResponse` becomes `a_p_i_response`.
pub fn camel_to_snake(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    for (i, ch) in s.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(ch.to_ascii_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}

/// Deep copy of `value` with every object key rewritten to camelCase.
pub fn to_camel(value: &Value) -> Value {
    convert_keys(value, &snake_to_camel)
}

/// Deep copy of `value` with every object key rewritten to snake_case.
pub fn to_snake(value: &Value) -> Value {
    convert_keys(value, &camel_to_snake)
}

fn convert_keys(value: &Value, rename: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(|v| convert_keys(v, rename)).collect()),
        Value::Object(obj) => {
            let mut converted = Map::with_capacity(obj.len());
            // colliding keys: last write wins
            for (key, v) in obj {
                converted.insert(rename(key), convert_keys(v, rename));
            }
            Value::Object(converted)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_snake_to_camel_simple() {
        assert_eq!(snake_to_camel("user_name"), "userName");
        assert_eq!(snake_to_camel("user_profile_image_url"), "userProfileImageUrl");
        assert_eq!(snake_to_camel("api_v2_response"), "apiV2Response");
    }

    #[test]
    fn test_snake_to_camel_single_word_and_empty() {
        assert_eq!(snake_to_camel("user"), "user");
        assert_eq!(snake_to_camel(""), "");
    }

    #[test]
    fn test_snake_to_camel_only_letter_after_underscore() {
        assert_eq!(snake_to_camel("user_id_123"), "userId_123");
        assert_eq!(snake_to_camel("user__name"), "user_Name");
        assert_eq!(snake_to_camel("user_name_"), "userName_");
        assert_eq!(snake_to_camel("_user_name"), "UserName");
        assert_eq!(snake_to_camel("user_Name"), "user_Name");
    }

    #[test]
    fn test_camel_to_snake_simple() {
        assert_eq!(camel_to_snake("userName"), "user_name");
        assert_eq!(camel_to_snake("userProfileImageUrl"), "user_profile_image_url");
        assert_eq!(camel_to_snake("apiV2Response"), "api_v2_response");
        assert_eq!(camel_to_snake("userId123"), "user_id123");
    }

    #[test]
    fn test_camel_to_snake_acronyms_fragment() {
        assert_eq!(camel_to_snake("APIResponse"), "a_p_i_response");
        assert_eq!(camel_to_snake("JSONData"), "j_s_o_n_data");
        assert_eq!(camel_to_snake("UserID"), "user_i_d");
        assert_eq!(camel_to_snake("getHTTPResponse"), "get_h_t_t_p_response");
    }

    #[test]
    fn test_camel_to_snake_leading_capital() {
        assert_eq!(camel_to_snake("UserName"), "user_name");
        assert_eq!(camel_to_snake("already_snake"), "already_snake");
    }

    #[test]
    fn test_to_camel_flat_object() {
        assert_eq!(to_camel(&json!({"user_name": "a"})), json!({"userName": "a"}));
        assert_eq!(to_snake(&json!({"userName": "a"})), json!({"user_name": "a"}));
    }

    #[test]
    fn test_to_camel_nested_objects_and_arrays() {
        let input = json!({"a": {"b_c": [{"d_e": 1}]}});
        assert_eq!(to_camel(&input), json!({"a": {"bC": [{"dE": 1}]}}));
    }

    #[test]
    fn test_arrays_keep_order_and_length() {
        let input = json!([{"user_id": 1}, 2, "three_four", null, [{"x_y": true}]]);
        let out = to_camel(&input);
        assert_eq!(out, json!([{"userId": 1}, 2, "three_four", null, [{"xY": true}]]));
    }

    #[test]
    fn test_primitives_pass_through() {
        for v in [json!(null), json!(42), json!(-1.5), json!("snake_case"), json!(true)] {
            assert_eq!(to_camel(&v), v);
            assert_eq!(to_snake(&v), v);
        }
    }

    #[test]
    fn test_string_values_are_not_inspected() {
        let input = json!({"created_at": "2024-01-01T00:00:00Z", "caption": "hello_world"});
        let out = to_camel(&input);
        assert_eq!(out["createdAt"], "2024-01-01T00:00:00Z");
        assert_eq!(out["caption"], "hello_world");
    }

    #[test]
    fn test_input_is_not_mutated() {
        let input = json!({"user_name": {"first_name": "a"}});
        let before = input.clone();
        let _ = to_camel(&input);
        assert_eq!(input, before);
    }

    #[test]
    fn test_collision_last_write_wins() {
        // both keys map to "userName"; iteration order is sorted without preserve_order
        let input = json!({"userName": 1, "user_name": 2});
        let out = to_camel(&input);
        assert_eq!(out.as_object().unwrap().len(), 1);
        assert_eq!(out["userName"], 2);
    }

    #[test]
    fn test_backend_user_payload() {
        let input = json!({
            "user": {
                "id": 7,
                "full_name": "Demo User",
                "profile_image_url": "https://example.com/a.png",
                "created_at": "2024-01-01"
            },
            "followersList": [{"user_followed_id": 7}]
        });
        let out = to_camel(&input);
        assert_eq!(out["user"]["fullName"], "Demo User");
        assert_eq!(out["user"]["profileImageUrl"], "https://example.com/a.png");
        assert_eq!(out["followersList"][0]["userFollowedId"], 7);
    }

    proptest! {
        #[test]
        fn prop_camel_snake_camel_is_stable(
            keys in proptest::collection::vec("[a-z]{1,8}_[a-z]{1,8}", 1..6),
            n in 0i64..1000,
        ) {
            let obj: Map<String, Value> = keys.into_iter().map(|k| (k, json!(n))).collect();
            let x = Value::Object(obj);
            let once = to_camel(&x);
            prop_assert_eq!(to_camel(&to_snake(&once)), once);
        }

        #[test]
        fn prop_single_words_unchanged(word in "[a-z]{1,12}") {
            prop_assert_eq!(snake_to_camel(&word), word.clone());
            prop_assert_eq!(camel_to_snake(&word), word);
        }
    }
}
