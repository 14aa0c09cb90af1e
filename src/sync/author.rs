//! Fallback authorship for patches that carry none.

use std::env;
use std::fs;

use log::debug;

use crate::repo::Identity;

/// Identity used when a patch has no authorship of its own: the passwd
/// database's full name (first gecos field) or the login name, with the
/// email taken from `$EMAIL` or derived as `login@hostname`.
pub fn fallback_identity() -> Identity {
    let login = env::var("USER")
        .or_else(|_| env::var("LOGNAME"))
        .unwrap_or_else(|_| "nobody".to_string());

    let passwd = fs::read_to_string("/etc/passwd").unwrap_or_default();
    let name = full_name_from_passwd(&passwd, &login).unwrap_or_else(|| login.clone());

    let email = env::var("EMAIL").unwrap_or_else(|_| format!("{login}@{}", hostname()));
    debug!("fallback author: {name} <{email}>");
    Identity::new(name, email)
}

/// Full name for `login` from passwd-format `content`.
///
/// The gecos field can carry comma-separated sub-fields on some
/// distributions; only the first one is the name.
fn full_name_from_passwd(content: &str, login: &str) -> Option<String> {
    for line in content.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.first() != Some(&login) {
            continue;
        }
        let gecos = fields.get(4)?;
        let name = gecos.split(',').next().unwrap_or("").trim();
        return (!name.is_empty()).then(|| name.to_string());
    }
    None
}

fn hostname() -> String {
    if let Ok(name) = env::var("HOSTNAME") {
        if !name.is_empty() {
            return name;
        }
    }
    fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
