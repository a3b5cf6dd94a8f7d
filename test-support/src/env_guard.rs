//! Test helpers for managing environment variables.
//!
//! `EnvVarGuard` sets or removes variables for its lifetime and restores the
//! previous values on drop. Tests touching the environment must run under
//! `serial_test::serial`.

use std::ffi::OsString;

#[derive(Debug, Default)]
pub struct EnvVarGuard {
    saved: Vec<(String, Option<OsString>)>,
}

impl EnvVarGuard {
    /// Set an environment variable for the lifetime of the returned guard.
    pub fn set(key: &str, value: &str) -> Self {
        let mut guard = Self::default();
        guard.and_set(key, value);
        guard
    }

    /// Remove an environment variable for the lifetime of the returned guard.
    pub fn remove(key: &str) -> Self {
        let mut guard = Self::default();
        guard.and_remove(key);
        guard
    }

    /// Set a further variable, restored together with the others.
    pub fn and_set(&mut self, key: &str, value: &str) -> &mut Self {
        self.save(key);
        set_env_var(key, value);
        self
    }

    /// Remove a further variable, restored together with the others.
    pub fn and_remove(&mut self, key: &str) -> &mut Self {
        self.save(key);
        remove_env_var(key);
        self
    }

    fn save(&mut self, key: &str) {
        self.saved.push((key.to_owned(), std::env::var_os(key)));
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        // Restore in reverse so repeated keys end at their first saved value.
        for (key, original) in self.saved.drain(..).rev() {
            match original {
                Some(v) => unsafe { std::env::set_var(&key, v) },
                None => remove_env_var(&key),
            }
        }
    }
}

/// SAFETY: Must only be called from serial test contexts.
pub(crate) fn set_env_var(key: &str, value: &str) {
    unsafe { std::env::set_var(key, value) };
}

/// SAFETY: Must only be called from serial test contexts.
pub(crate) fn remove_env_var(key: &str) {
    unsafe { std::env::remove_var(key) };
}
