mod sqlite;

use anyhow::Result;

pub use sqlite::{default_db_path, TokenStore};

/// Fixed key the bearer token is stored under.
pub const TOKEN_KEY: &str = "Isntgram_access_token";

/// Where the bearer token lives between calls.
pub trait TokenStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process storage; forgotten at exit.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryTokens {
    values: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

#[cfg(test)]
impl TokenStorage for MemoryTokens {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
impl MemoryTokens {
    fn lock(&self) -> std::sync::MutexGuard<'_, std::collections::HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}
