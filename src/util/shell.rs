use std::ffi::OsStr;

/// Quotes `word` for a POSIX shell, leaving it alone when that is safe.
pub fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word.chars().all(|c| {
            c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c)
        })
    {
        return word.to_string();
    }

    format!("'{}'", word.replace('\'', "'\"'\"'"))
}

pub fn shell_join<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn os_to_strings<S: AsRef<OsStr>>(args: &[S]) -> Vec<String> {
    args.iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect()
}

/// "1" or "0", the way systemd environment switches want booleans.
pub fn one_zero(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("apt-get"), "apt-get");
        assert_eq!(shell_quote("-oDir::Etc=etc/apt"), "-oDir::Etc=etc/apt");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("?essential"), "'?essential'");
        assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
    }

    #[test]
    fn test_shell_join() {
        assert_eq!(
            shell_join(&["sh", "-c", "exit 1"]),
            "sh -c 'exit 1'"
        );
    }
}
