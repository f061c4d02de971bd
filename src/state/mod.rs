use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::api::models::{Follow, Like, LikeableType, Post, User};

/// Everything the client knows about the signed-in user. Built from API
/// responses, replaced on the next fetch and cleared on logout.
#[derive(Debug, Default, Clone)]
pub struct AppState {
    pub current_user: Option<User>,
    /// Posts keyed by id, in the order they were first seen
    pub posts: IndexMap<i64, Post>,
    /// Like ids keyed by what was liked
    pub likes: HashMap<(LikeableType, i64), i64>,
    /// Ids of users the current user follows
    pub follows: HashSet<i64>,
}

impl AppState {
    pub fn is_authenticated(&self) -> bool {
        self.current_user.is_some()
    }

    pub fn current_user_id(&self) -> Option<i64> {
        self.current_user.as_ref().map(|u| u.id)
    }

    /// Insert or replace posts. New ids go to the end; known ids keep their slot.
    pub fn merge_posts(&mut self, posts: impl IntoIterator<Item = Post>) {
        for post in posts {
            self.posts.insert(post.id, post);
        }
    }

    pub fn remove_post(&mut self, post_id: i64) -> Option<Post> {
        self.posts.shift_remove(&post_id)
    }

    /// Record likes made by the current user; others are ignored.
    pub fn record_likes<'a>(&mut self, likes: impl IntoIterator<Item = &'a Like>) {
        let Some(me) = self.current_user_id() else {
            return;
        };
        for like in likes.into_iter().filter(|l| l.user_id == me) {
            self.likes.insert((like.likeable_type, like.likeable_id), like.id);
        }
    }

    pub fn forget_like(&mut self, like_id: i64) {
        self.likes.retain(|_, id| *id != like_id);
    }

    pub fn like_id(&self, kind: LikeableType, target_id: i64) -> Option<i64> {
        self.likes.get(&(kind, target_id)).copied()
    }

    /// Replace the follow set from the current user's `following` list.
    pub fn set_following(&mut self, follows: &[Follow]) {
        self.follows = follows.iter().map(|f| f.user_followed_id).collect();
    }

    pub fn is_following(&self, user_id: i64) -> bool {
        self.follows.contains(&user_id)
    }

    pub fn clear(&mut self) {
        *self = AppState::default();
    }
}

/// Single owner of the session's [`AppState`].
///
/// Readers and writers go through closures so a lock is never held across
/// an await point.
#[derive(Debug, Default)]
pub struct SessionState {
    inner: RwLock<AppState>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn snapshot(&self) -> AppState {
        self.read(AppState::clone)
    }

    pub fn set_current_user(&self, user: Option<User>) {
        if let Some(u) = &user {
            tracing::debug!("Current user set to {} ({})", u.username, u.id);
        }
        self.update(|s| s.current_user = user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64) -> User {
        User {
            id,
            username: format!("user{id}"),
            email: None,
            full_name: None,
            profile_image_url: None,
            bio: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn post(id: i64) -> Post {
        Post {
            id,
            user_id: 1,
            image_url: format!("https://example.com/{id}.png"),
            caption: None,
            created_at: None,
            updated_at: None,
            user: None,
            like_count: None,
            comment_count: None,
            likes: vec![],
            comments: vec![],
        }
    }

    fn like(id: i64, user_id: i64, target: i64) -> Like {
        Like {
            id,
            user_id,
            likeable_id: target,
            likeable_type: LikeableType::Post,
            created_at: None,
        }
    }

    #[test]
    fn test_merge_posts_keeps_first_seen_order() {
        let mut state = AppState::default();
        state.merge_posts(vec![post(3), post(1)]);
        let mut updated = post(3);
        updated.caption = Some("edited".into());
        state.merge_posts(vec![post(2), updated]);

        let order: Vec<i64> = state.posts.keys().copied().collect();
        assert_eq!(order, vec![3, 1, 2]);
        assert_eq!(state.posts[&3].caption.as_deref(), Some("edited"));
    }

    #[test]
    fn test_remove_post_preserves_order() {
        let mut state = AppState::default();
        state.merge_posts(vec![post(1), post(2), post(3)]);
        state.remove_post(2);
        let order: Vec<i64> = state.posts.keys().copied().collect();
        assert_eq!(order, vec![1, 3]);
    }

    #[test]
    fn test_record_likes_only_for_current_user() {
        let mut state = AppState::default();
        state.current_user = Some(user(1));
        state.record_likes(&[like(10, 1, 5), like(11, 2, 6)]);
        assert_eq!(state.like_id(LikeableType::Post, 5), Some(10));
        assert_eq!(state.like_id(LikeableType::Post, 6), None);

        state.forget_like(10);
        assert_eq!(state.like_id(LikeableType::Post, 5), None);
    }

    #[test]
    fn test_record_likes_without_user_is_noop() {
        let mut state = AppState::default();
        state.record_likes(&[like(10, 1, 5)]);
        assert!(state.likes.is_empty());
    }

    #[test]
    fn test_set_following() {
        let mut state = AppState::default();
        state.set_following(&[Follow {
            id: 1,
            user_id: 1,
            user_followed_id: 7,
            created_at: None,
        }]);
        assert!(state.is_following(7));
        assert!(!state.is_following(1));
    }

    #[test]
    fn test_session_clear_on_logout() {
        let session = SessionState::new();
        session.set_current_user(Some(user(1)));
        session.update(|s| {
            s.merge_posts(vec![post(1)]);
            s.follows.insert(2);
        });
        assert!(session.read(AppState::is_authenticated));

        session.update(AppState::clear);
        let snap = session.snapshot();
        assert!(!snap.is_authenticated());
        assert!(snap.posts.is_empty());
        assert!(snap.follows.is_empty());
    }
}
