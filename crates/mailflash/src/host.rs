//! Local user and host lookups.

use std::env;

/// Returns the local hostname, or `localhost` when it cannot be read.
pub fn hostname() -> String {
    gethostname::gethostname()
        .into_string()
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Returns the login name of the current user.
///
/// Checks `LOGNAME`, `USER`, `LNAME` and `USERNAME` in that order, then
/// falls back to the name of the home directory.
pub fn username() -> String {
    username_from(|key| env::var(key).ok())
}

/// Returns `<user>@<host>` for the current process.
pub fn local_sender() -> String {
    format!("{}@{}", username(), hostname())
}

fn username_from<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ["LOGNAME", "USER", "LNAME", "USERNAME"]
        .into_iter()
        .filter_map(lookup)
        .find(|name| !name.is_empty())
        .or_else(|| {
            dirs::home_dir()
                .and_then(|home| home.file_name()?.to_str().map(ToString::to_string))
        })
        .unwrap_or_else(|| "nobody".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_prefers_logname() {
        let name = username_from(|key| match key {
            "LOGNAME" => Some("alice".into()),
            "USER" => Some("bob".into()),
            _ => None,
        });
        assert_eq!(name, "alice");
    }

    #[test]
    fn test_username_skips_empty_values() {
        let name = username_from(|key| match key {
            "LOGNAME" => Some(String::new()),
            "USERNAME" => Some("carol".into()),
            _ => None,
        });
        assert_eq!(name, "carol");
    }

    #[test]
    fn test_local_sender_shape() {
        let sender = local_sender();
        let (user, host) = sender.split_once('@').unwrap_or_default();
        assert!(!user.is_empty());
        assert!(!host.is_empty());
    }
}
