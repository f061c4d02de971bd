use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::error::ApiError;
use super::middleware::api_call;
use super::models::*;
use super::transport::{FormPart, HttpRequest, Transport};
use crate::state::SessionState;
use crate::store::{TokenStorage, TOKEN_KEY};

/// An image read from disk, ready to go out as the `file` part of a
/// multipart upload.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime: String,
    pub data: Vec<u8>,
}

impl ImageUpload {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read image: {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload.png".into());
        let mime = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self {
            file_name,
            mime,
            data,
        })
    }

    fn into_part(self) -> FormPart {
        FormPart {
            name: "file".into(),
            file_name: Some(self.file_name),
            mime: Some(self.mime),
            data: self.data,
        }
    }
}

/// Typed access to the Isntgram API. Every call goes through the
/// case-converting middleware and keeps the session state current.
pub struct ApiClient<T> {
    transport: T,
    base_url: String,
    tokens: Box<dyn TokenStorage>,
    session: SessionState,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, base_url: impl Into<String>, tokens: Box<dyn TokenStorage>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            session: SessionState::new(),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    // ── Token handling ─────────────────────────────────────────────────

    pub fn token(&self) -> Option<String> {
        match self.tokens.get(TOKEN_KEY) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Could not read access token: {e:#}");
                None
            }
        }
    }

    fn store_token(&self, token: &str) {
        if let Err(e) = self.tokens.set(TOKEN_KEY, token) {
            tracing::warn!("Could not store access token: {e:#}");
        }
    }

    fn remove_token(&self) {
        if let Err(e) = self.tokens.remove(TOKEN_KEY) {
            tracing::warn!("Could not remove access token: {e:#}");
        }
    }

    fn keep_token_from(&self, response: &Value) {
        if let Some(token) = response.get("accessToken").and_then(Value::as_str) {
            self.store_token(token);
        }
    }

    // ── Request plumbing ───────────────────────────────────────────────

    fn request(&self, method: Method, path: &str) -> HttpRequest {
        let req = HttpRequest::new(method, format!("{}{}", self.base_url, path));
        match self.token() {
            Some(token) => req.header(AUTHORIZATION, &format!("Bearer {token}")),
            None => req,
        }
    }

    async fn get(&self, path: &str) -> Result<Value, ApiError> {
        api_call(&self.transport, self.request(Method::GET, path)).await
    }

    async fn send_json(&self, method: Method, path: &str, body: &Value) -> Result<Value, ApiError> {
        api_call(&self.transport, self.request(method, path).json(body)).await
    }

    async fn send_empty(&self, method: Method, path: &str) -> Result<Value, ApiError> {
        api_call(&self.transport, self.request(method, path)).await
    }

    fn require_user_id(&self) -> Result<i64, ApiError> {
        self.session
            .read(|s| s.current_user_id())
            .ok_or_else(|| ApiError::Rejected("Not authenticated".into()))
    }

    // ── Auth ───────────────────────────────────────────────────────────

    /// Who the server thinks we are.
    pub async fn authenticate(&self) -> Result<User, ApiError> {
        let response = self.get("/api/auth").await?;
        let user: User = field(&response, "user")?;
        self.session.set_current_user(Some(user.clone()));
        Ok(user)
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<User, ApiError> {
        let response = self
            .send_json(Method::POST, "/api/auth/login", &to_json(request)?)
            .await?;
        let user: User = field(&response, "user")?;
        self.keep_token_from(&response);
        self.session.set_current_user(Some(user.clone()));
        tracing::info!("Logged in as {}", user.username);
        Ok(user)
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<User, ApiError> {
        let response = self
            .send_json(Method::POST, "/api/auth/signup", &to_json(request)?)
            .await?;
        let user: User = field(&response, "user")?;
        self.keep_token_from(&response);
        self.session.set_current_user(Some(user.clone()));
        tracing::info!("Signed up as {}", user.username);
        Ok(user)
    }

    /// Log out and forget the session and the stored token.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.send_empty(Method::POST, "/api/auth/logout").await?;
        self.session.update(|s| s.clear());
        self.remove_token();
        Ok(())
    }

    // ── Users ──────────────────────────────────────────────────────────

    pub async fn lookup_user(&self, username: &str) -> Result<User, ApiError> {
        let response = self
            .get(&format!("/api/user/lookup/{}", urlencoding::encode(username)))
            .await?;
        field(&response, "user")
    }

    pub async fn get_profile(&self, username: &str) -> Result<Profile, ApiError> {
        let response = self
            .get(&format!("/api/profile/{}", urlencoding::encode(username)))
            .await?;
        let profile: Profile = parse(response, "profile")?;
        self.session.update(|s| {
            if s.current_user_id() == Some(profile.user.id) {
                s.set_following(&profile.following_list);
            }
        });
        Ok(profile)
    }

    pub async fn update_user(&self, request: &UpdateUserRequest) -> Result<User, ApiError> {
        let response = self
            .send_json(Method::PUT, "/api/user", &to_json(request)?)
            .await?;
        let user: User = field(&response, "user")?;
        self.keep_token_from(&response);
        self.session.set_current_user(Some(user.clone()));
        Ok(user)
    }

    /// Put the default avatar back.
    pub async fn reset_user_image(&self, user_id: i64) -> Result<User, ApiError> {
        let response = self.get(&format!("/api/user/{user_id}/resetImg")).await?;
        let user: User = parse(response, "user")?;
        self.session.update(|s| {
            if s.current_user_id() == Some(user.id) {
                s.current_user = Some(user.clone());
            }
        });
        Ok(user)
    }

    // ── Posts ──────────────────────────────────────────────────────────

    pub async fn get_post(&self, post_id: i64) -> Result<Post, ApiError> {
        let response = self.get(&format!("/api/post/{post_id}")).await?;
        let post: Post = field(&response, "post")?;
        self.remember_posts(std::slice::from_ref(&post));
        Ok(post)
    }

    pub async fn create_post(&self, image_url: &str, caption: Option<&str>) -> Result<Post, ApiError> {
        let body = json!({ "imageUrl": image_url, "caption": caption });
        let response = self.send_json(Method::POST, "/api/post", &body).await?;
        let post: Post = field(&response, "post")?;
        self.remember_posts(std::slice::from_ref(&post));
        Ok(post)
    }

    pub async fn update_post(&self, post_id: i64, caption: &str) -> Result<Post, ApiError> {
        let body = json!({ "caption": caption });
        let response = self
            .send_json(Method::PUT, &format!("/api/post/{post_id}"), &body)
            .await?;
        let post: Post = field(&response, "post")?;
        self.remember_posts(std::slice::from_ref(&post));
        Ok(post)
    }

    pub async fn delete_post(&self, post_id: i64) -> Result<(), ApiError> {
        self.send_empty(Method::DELETE, &format!("/api/post/{post_id}"))
            .await?;
        self.session.update(|s| s.remove_post(post_id));
        Ok(())
    }

    /// One page of posts from users following `user_id`.
    pub async fn home_page(&self, user_id: i64, offset: usize) -> Result<Vec<Post>, ApiError> {
        let response = self
            .get(&format!("/api/post/{user_id}/scroll/{offset}"))
            .await?;
        let posts: Vec<Post> = field(&response, "posts")?;
        self.remember_posts(&posts);
        Ok(posts)
    }

    /// One page of the randomized explore grid.
    pub async fn explore_page(&self, offset: usize) -> Result<Vec<Post>, ApiError> {
        let response = self.get(&format!("/api/post/explore/{offset}")).await?;
        let posts: Vec<Post> = field(&response, "posts")?;
        self.remember_posts(&posts);
        Ok(posts)
    }

    fn remember_posts(&self, posts: &[Post]) {
        self.session.update(|s| {
            for post in posts {
                s.record_likes(&post.likes);
            }
            s.merge_posts(posts.iter().cloned());
        });
    }

    // ── Comments ───────────────────────────────────────────────────────

    pub async fn create_comment(&self, post_id: i64, content: &str) -> Result<Comment, ApiError> {
        let user_id = self.require_user_id()?;
        let body = json!({ "userId": user_id, "postId": post_id, "content": content });
        let response = self.send_json(Method::POST, "/api/comment", &body).await?;
        let comment: Comment = parse(response, "comment")?;
        self.session.update(|s| {
            if let Some(post) = s.posts.get_mut(&post_id) {
                post.comments.push(comment.clone());
            }
        });
        Ok(comment)
    }

    // ── Likes ──────────────────────────────────────────────────────────

    pub async fn likes_for(&self, kind: LikeableType, target_id: i64) -> Result<Vec<Like>, ApiError> {
        let response = self.get(&format!("/api/like/{kind}/{target_id}")).await?;
        let likes: Vec<Like> = field(&response, "likes")?;
        self.session.update(|s| s.record_likes(&likes));
        Ok(likes)
    }

    pub async fn user_likes(&self, user_id: i64) -> Result<Vec<Like>, ApiError> {
        let response = self.get(&format!("/api/like/user/{user_id}")).await?;
        let likes: Vec<Like> = field(&response, "likes")?;
        self.session.update(|s| s.record_likes(&likes));
        Ok(likes)
    }

    pub async fn like(&self, kind: LikeableType, target_id: i64) -> Result<Like, ApiError> {
        let user_id = self.require_user_id()?;
        let body = json!({ "userId": user_id, "id": target_id, "likeableType": kind });
        let response = self.send_json(Method::POST, "/api/like", &body).await?;
        let like: Like = field(&response, "like")?;
        self.session.update(|s| s.record_likes(std::slice::from_ref(&like)));
        Ok(like)
    }

    pub async fn unlike(&self, like_id: i64) -> Result<Like, ApiError> {
        let body = json!({ "id": like_id });
        let response = self.send_json(Method::DELETE, "/api/like", &body).await?;
        let like: Like = parse(response, "like")?;
        self.session.update(|s| s.forget_like(like_id));
        Ok(like)
    }

    // ── Follows ────────────────────────────────────────────────────────

    /// Users following `user_id`.
    pub async fn followers(&self, user_id: i64) -> Result<Vec<Follow>, ApiError> {
        let response = self.get(&format!("/api/follow/{user_id}")).await?;
        field(&response, "follows")
    }

    /// Users `user_id` follows. Refreshes the follow set for the current user.
    pub async fn following(&self, user_id: i64) -> Result<Vec<Follow>, ApiError> {
        let response = self.get(&format!("/api/follow/{user_id}/following")).await?;
        let follows: Vec<Follow> = field(&response, "follows")?;
        self.session.update(|s| {
            if s.current_user_id() == Some(user_id) {
                s.set_following(&follows);
            }
        });
        Ok(follows)
    }

    pub async fn follow(&self, target_id: i64) -> Result<Follow, ApiError> {
        let user_id = self.require_user_id()?;
        let body = json!({ "userId": user_id, "userFollowedId": target_id });
        let response = self.send_json(Method::POST, "/api/follow", &body).await?;
        rejected(&response)?;
        let follow: Follow = parse(response, "follow")?;
        self.session.update(|s| s.follows.insert(target_id));
        Ok(follow)
    }

    pub async fn unfollow(&self, target_id: i64) -> Result<Follow, ApiError> {
        let user_id = self.require_user_id()?;
        let body = json!({ "userId": user_id, "userFollowedId": target_id });
        let response = self.send_json(Method::DELETE, "/api/follow", &body).await?;
        rejected(&response)?;
        let follow: Follow = parse(response, "follow")?;
        self.session.update(|s| s.follows.remove(&target_id));
        Ok(follow)
    }

    // ── Search ─────────────────────────────────────────────────────────

    /// Username search. An empty query returns nothing without a request.
    pub async fn search(&self, query: &str) -> Result<Vec<User>, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let encoded = urlencoding::encode(&query.to_lowercase()).into_owned();
        let response = self.get(&format!("/api/search?query={encoded}")).await?;
        field(&response, "results")
    }

    // ── Uploads ────────────────────────────────────────────────────────

    /// Upload a new avatar; returns the stored image URL.
    pub async fn upload_profile_image(&self, user_id: i64, image: ImageUpload) -> Result<String, ApiError> {
        let req = self
            .request(Method::POST, &format!("/api/aws/{user_id}"))
            .multipart(vec![image.into_part()]);
        let response = api_call(&self.transport, req).await?;
        let url: String = field(&response, "img")?;
        self.session.update(|s| {
            if let Some(me) = s.current_user.as_mut().filter(|u| u.id == user_id) {
                me.profile_image_url = Some(url.clone());
            }
        });
        Ok(url)
    }

    /// Upload an image and create a post from it in one step.
    pub async fn upload_post(&self, caption: Option<&str>, image: ImageUpload) -> Result<Post, ApiError> {
        let user_id = self.require_user_id()?;
        let caption = match caption {
            Some(c) if !c.is_empty() => urlencoding::encode(c).into_owned(),
            _ => "null".to_string(),
        };
        let req = self
            .request(Method::POST, &format!("/api/aws/post/{user_id}/{caption}"))
            .multipart(vec![image.into_part()]);
        let response = api_call(&self.transport, req).await?;
        rejected(&response)?;
        let post: Post = parse(response, "post")?;
        self.remember_posts(std::slice::from_ref(&post));
        Ok(post)
    }
}

// ─── Response helpers ──────────────────────────────────────────────────────

fn to_json<S: serde::Serialize>(value: &S) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::MalformedBody(e.to_string()))
}

/// Pull `key` out of a response object.
fn field<D: DeserializeOwned>(value: &Value, key: &str) -> Result<D, ApiError> {
    let v = value.get(key).ok_or_else(|| ApiError::Shape(key.to_string()))?;
    serde_json::from_value(v.clone()).map_err(|e| ApiError::Shape(format!("{key} ({e})")))
}

/// Read the whole response as `what`.
fn parse<D: DeserializeOwned>(value: Value, what: &str) -> Result<D, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Shape(format!("{what} ({e})")))
}

/// Some routes answer 2xx with `{"error": "..."}`.
fn rejected(value: &Value) -> Result<(), ApiError> {
    match value.get("error").and_then(Value::as_str) {
        Some(msg) => Err(ApiError::Rejected(msg.to_string())),
        None => Ok(()),
    }
}
