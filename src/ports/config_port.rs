//! Configuration access port trait.

/// Raw key/value access. Typed parsing and validation live in
/// [`config_validation`](crate::domain::config_validation).
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
}
