// mysql-dumper/src/backup/privilege.rs
use crate::utils::shell::Quote;

const DELIMITER: &str = "END_OF_SUDO";

/// Runs a whole dump-stage script as `sudo_user`.
///
/// The script goes through a quoted heredoc into a single `sudo -s`, so an
/// `&&` chain stays one unit under one identity and the outer shell expands
/// nothing inside it.
pub fn wrap(script: String, sudo: &str, sudo_user: Option<&str>) -> String {
    match sudo_user {
        None => script,
        Some(user) => format!(
            "{} -s -u {} -- <<'{delim}'\n{}\n{delim}",
            Quote::Escaped.apply(sudo),
            Quote::Escaped.apply(user),
            script,
            delim = DELIMITER,
        ),
    }
}
