//! Immutable virtual filesystem the fake shell serves `ls`/`cat` from.
//!
//! Grounded on `high_engagement.py`'s `FAKE_FILES` map: a fixed set of
//! planted documents designed to look worth stealing.

/// (absolute path, contents) pairs. Built once, shared by reference —
/// no runtime mutation, no locking.
const FILES: &[(&str, &str)] = &[
    (
        "/etc/passwd",
        "root:x:0:0:root:/root:/bin/bash\nadmin:x:1000:1000:Admin:/home/admin:/bin/bash\n",
    ),
    (
        "/home/admin/.env",
        "DB_USER=admin\nDB_PASS=Admin123!\nAPI_KEY=abcd-efgh-1234\n",
    ),
    (
        "/var/www/html/index.html",
        "<html><body>ACME Corp Webroot</body></html>\n",
    ),
    ("/root/notes.txt", "Backup creds: backup_user:Backup#2025\n"),
    (
        "/root/db_dump.sql",
        "-- fake db dump\nCREATE TABLE users (id INT, name TEXT);\nINSERT INTO users VALUES (1,'alice');\n",
    ),
];

/// Returns the contents of `path` if it exists in the virtual filesystem.
pub fn read(path: &str) -> Option<&'static str> {
    FILES
        .iter()
        .find(|(p, _)| *p == path)
        .map(|(_, content)| *content)
}

/// Renders an `ls`-style directory listing of every file directly or
/// transitively under `cwd`. Mirrors the reference shell: one synthetic
/// `.` entry followed by the immediate children of `cwd`, by size.
pub fn list_dir(cwd: &str) -> Vec<String> {
    let mut lines = vec!["drwxr-xr-x 3 root root 4096 Nov  1 10:01 .".to_string()];

    for (path, content) in FILES {
        if let Some(name) = child_name(path, cwd) {
            lines.push(format!(
                "-rw-r--r-- 1 root root {} Nov  1 10:01 {}",
                content.len(),
                name
            ));
        }
    }

    if lines.len() == 1 {
        lines = vec!["total 0".to_string()];
    }
    lines
}

/// If `path` is a direct child of `cwd` (no further `/`), returns its
/// basename. Directories nested deeper than one level are not listed,
/// matching the reference implementation's flat `ls`.
fn child_name<'a>(path: &'a str, cwd: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(cwd)?;
    let rest = rest.trim_start_matches('/');
    if rest.is_empty() || rest.contains('/') {
        None
    } else {
        Some(rest)
    }
}

/// Resolves a (possibly relative) shell argument against `cwd` the way a
/// real shell would: absolute paths pass through, anything else is
/// joined onto `cwd`.
pub fn resolve(cwd: &str, arg: &str) -> String {
    if arg.starts_with('/') {
        arg.to_string()
    } else {
        format!("{}/{arg}", cwd.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_planted_passwd_file() {
        assert_eq!(read("/etc/passwd"), Some(FILES[0].1));
    }

    #[test]
    fn missing_path_is_none() {
        assert!(read("/nonexistent").is_none());
    }

    #[test]
    fn root_listing_shows_notes_and_dump_but_not_passwd() {
        let listing = list_dir("/root").join("\n");
        assert!(listing.contains("notes.txt"));
        assert!(listing.contains("db_dump.sql"));
        assert!(!listing.contains("passwd"));
    }

    #[test]
    fn etc_listing_shows_passwd() {
        let listing = list_dir("/etc").join("\n");
        assert!(listing.contains("passwd"));
    }

    #[test]
    fn resolve_keeps_absolute_paths_unchanged() {
        assert_eq!(resolve("/root", "/etc/passwd"), "/etc/passwd");
    }

    #[test]
    fn resolve_joins_relative_paths_onto_cwd() {
        assert_eq!(resolve("/root", "notes.txt"), "/root/notes.txt");
    }
}
