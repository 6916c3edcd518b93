//! Permission Evaluator (C2).
//!
//! Pure function: given a permissions document, a command name, and
//! (already sanitized) arguments, decide whether the command may be
//! forwarded to the Agent. No I/O, no locking — this module is trivially
//! unit-testable in isolation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One restriction entry of a command rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restriction {
    pub path: String,
    pub allow: bool,
    #[serde(default)]
    pub allow_subdir: Option<bool>,
}

/// A single command's access rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub allow: bool,
    #[serde(default)]
    pub restrictions: Vec<Restriction>,
}

/// `permissions.commands`: command name → rule. Snapshotted onto an
/// Operator attachment at attach time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub commands: HashMap<String, Rule>,
}

/// `ls_dir` addresses a directory itself; every other known command
/// addresses a specific file, so its restriction path is matched against
/// the argument's *parent* directory.
fn is_file_command(cmd: &str) -> bool {
    cmd != "ls_dir"
}

/// Collapses redundant separators and `.` segments. Does not resolve `..`
/// (that is the sanitizer's job, upstream of this evaluator).
pub fn normalize_path(path: &str) -> String {
    let is_absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        segments.push(segment);
    }
    let joined = segments.join("/");
    if is_absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Parent directory of `path`, normalized. A bare filename with no
/// separator yields `.` (current directory).
pub fn parent_directory(path: &str) -> String {
    let normalized = normalize_path(path);
    match normalized.rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
        None => ".".to_string(),
    }
}

fn arg_as_str(arg: &Value) -> Option<&str> {
    arg.as_str()
}

/// Evaluate whether `cmd` may run with `args` under `permissions`.
///
/// See the design spec's decision algorithm: first matching rule wins,
/// outer loop over arguments, inner loop over restrictions.
pub fn evaluate(permissions: &Permissions, cmd: &str, args: &[Value]) -> bool {
    if permissions.commands.is_empty() {
        return true;
    }

    let Some(rule) = permissions.commands.get(cmd) else {
        return true;
    };

    if rule.restrictions.is_empty() {
        return rule.allow;
    }

    let file_command = is_file_command(cmd);

    for arg in args {
        let Some(arg_str) = arg_as_str(arg) else {
            continue;
        };

        for restriction in &rule.restrictions {
            let rp = normalize_path(&restriction.path);

            if file_command {
                let requested = parent_directory(arg_str);
                if requested == rp {
                    return restriction.allow;
                }
                if let Some(rest) = requested.strip_prefix(&rp) {
                    if rest.is_empty() || rest.starts_with('/') {
                        return restriction.allow_subdir.unwrap_or(true);
                    }
                }
            }

            if arg_str.starts_with(&restriction.path) {
                return restriction.allow;
            }
        }
    }

    rule.allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn perms(cmd: &str, rule: Rule) -> Permissions {
        let mut commands = HashMap::new();
        commands.insert(cmd.to_string(), rule);
        Permissions { commands }
    }

    #[test]
    fn empty_permissions_allow_everything() {
        let permissions = Permissions::default();
        assert!(evaluate(&permissions, "ls_dir", &[json!("/etc")]));
    }

    #[test]
    fn unknown_command_is_allowed() {
        let permissions = perms(
            "ls_dir",
            Rule {
                allow: false,
                restrictions: vec![],
            },
        );
        assert!(evaluate(&permissions, "reboot", &[]));
    }

    #[test]
    fn no_restrictions_falls_back_to_rule_allow() {
        let permissions = perms(
            "ls_dir",
            Rule {
                allow: false,
                restrictions: vec![],
            },
        );
        assert!(!evaluate(&permissions, "ls_dir", &[json!("/etc")]));
    }

    #[test]
    fn directory_command_denies_exact_match() {
        let permissions = perms(
            "ls_dir",
            Rule {
                allow: true,
                restrictions: vec![Restriction {
                    path: "/etc".into(),
                    allow: false,
                    allow_subdir: None,
                }],
            },
        );
        assert!(!evaluate(&permissions, "ls_dir", &[json!("/etc")]));
        assert!(evaluate(&permissions, "ls_dir", &[json!("/home")]));
    }

    #[test]
    fn file_command_checks_parent_directory() {
        let permissions = perms(
            "download_file",
            Rule {
                allow: true,
                restrictions: vec![Restriction {
                    path: "/etc".into(),
                    allow: false,
                    allow_subdir: None,
                }],
            },
        );
        assert!(!evaluate(
            &permissions,
            "download_file",
            &[json!("/etc/passwd")]
        ));
        assert!(evaluate(
            &permissions,
            "download_file",
            &[json!("/home/user/file.txt")]
        ));
    }

    #[test]
    fn subdirectory_inherits_unless_allow_subdir_overrides() {
        let permissions = perms(
            "download_file",
            Rule {
                allow: false,
                restrictions: vec![Restriction {
                    path: "/data".into(),
                    allow: false,
                    allow_subdir: Some(true),
                }],
            },
        );
        // /data/sub/file.txt -> parent /data/sub, which is a subdir of /data
        assert!(evaluate(
            &permissions,
            "download_file",
            &[json!("/data/sub/file.txt")]
        ));
    }

    #[test]
    fn subdirectory_without_override_defaults_to_allow_true() {
        let permissions = perms(
            "download_file",
            Rule {
                allow: false,
                restrictions: vec![Restriction {
                    path: "/data".into(),
                    allow: false,
                    allow_subdir: None,
                }],
            },
        );
        assert!(evaluate(
            &permissions,
            "download_file",
            &[json!("/data/sub/file.txt")]
        ));
    }

    #[test]
    fn no_arg_matches_any_restriction_falls_back_to_rule_allow() {
        let permissions = perms(
            "download_file",
            Rule {
                allow: true,
                restrictions: vec![Restriction {
                    path: "/etc".into(),
                    allow: false,
                    allow_subdir: None,
                }],
            },
        );
        assert!(evaluate(
            &permissions,
            "download_file",
            &[json!("/home/user/report.pdf")]
        ));
    }
}
