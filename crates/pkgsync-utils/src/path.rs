use std::{env, path::PathBuf};

use crate::error::{PathError, PathResult};

/// Resolves a path that may contain `~` and `$VAR`/`${VAR}` references.
///
/// Relative results are joined onto the current working directory.
///
/// # Errors
///
/// * [`PathError::Empty`] if the path is empty
/// * [`PathError::CurrentDir`] if the current directory cannot be determined
/// * [`PathError::MissingEnvVar`] if a referenced variable is undefined
/// * [`PathError::UnclosedVariable`] for `${VAR` without a closing brace
pub fn resolve_path(path: &str) -> PathResult<PathBuf> {
    let path = path.trim();
    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let path_buf = PathBuf::from(expand_variables(path)?);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }

    env::current_dir()
        .map(|cwd| cwd.join(path_buf))
        .map_err(|source| PathError::CurrentDir { source })
}

pub fn home_dir() -> PathBuf {
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/"))
}

/// `$XDG_CONFIG_HOME`, falling back to `$HOME/.config`.
pub fn xdg_config_home() -> PathBuf {
    env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// `$XDG_DATA_HOME`, falling back to `$HOME/.local/share`.
pub fn xdg_data_home() -> PathBuf {
    env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

fn expand_variables(path: &str) -> PathResult<String> {
    let mut result = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '$' if chars.peek() == Some(&'{') => {
                chars.next();
                let mut var_name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    var_name.push(c);
                }
                if !closed {
                    return Err(PathError::UnclosedVariable {
                        input: format!("${{{var_name}"),
                    });
                }
                push_env_var(&var_name, &mut result, path)?;
            }
            '$' => {
                let mut var_name = String::new();
                while let Some(&c) = chars.peek() {
                    if !(c.is_alphanumeric() || c == '_') {
                        break;
                    }
                    var_name.push(c);
                    chars.next();
                }
                if var_name.is_empty() {
                    result.push('$');
                } else {
                    push_env_var(&var_name, &mut result, path)?;
                }
            }
            '~' if result.is_empty() => result.push_str(&home_dir().to_string_lossy()),
            _ => result.push(c),
        }
    }

    Ok(result)
}

fn push_env_var(var_name: &str, result: &mut String, original: &str) -> PathResult<()> {
    let value = match var_name {
        "HOME" => home_dir().to_string_lossy().into_owned(),
        "XDG_CONFIG_HOME" => xdg_config_home().to_string_lossy().into_owned(),
        "XDG_DATA_HOME" => xdg_data_home().to_string_lossy().into_owned(),
        _ => {
            env::var(var_name).map_err(|_| {
                PathError::MissingEnvVar {
                    var: var_name.into(),
                    input: original.into(),
                }
            })?
        }
    };
    result.push_str(&value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_expand_variables() {
        env::set_var("PKGSYNC_TEST_VAR", "value");
        assert_eq!(expand_variables("$PKGSYNC_TEST_VAR/db").unwrap(), "value/db");
        assert_eq!(expand_variables("${PKGSYNC_TEST_VAR}/db").unwrap(), "value/db");
        assert_eq!(expand_variables("path/$").unwrap(), "path/$");
        env::remove_var("PKGSYNC_TEST_VAR");

        assert!(matches!(
            expand_variables("${PKGSYNC_TEST_VAR"),
            Err(PathError::UnclosedVariable { .. })
        ));
        assert!(matches!(
            expand_variables("$PKGSYNC_TEST_VAR"),
            Err(PathError::MissingEnvVar { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_resolve_path() {
        env::set_var("HOME", "/tmp/home");

        assert!(matches!(resolve_path("  "), Err(PathError::Empty)));
        assert_eq!(resolve_path("/abs/path").unwrap(), PathBuf::from("/abs/path"));
        assert_eq!(resolve_path("~/db").unwrap(), PathBuf::from("/tmp/home/db"));
        assert_eq!(
            resolve_path("relative").unwrap(),
            env::current_dir().unwrap().join("relative")
        );
        assert_eq!(
            resolve_path("a/~/b").unwrap(),
            env::current_dir().unwrap().join("a/~/b")
        );
    }

    #[test]
    #[serial]
    fn test_xdg_directories() {
        env::set_var("HOME", "/tmp/home");
        env::remove_var("XDG_CONFIG_HOME");
        env::remove_var("XDG_DATA_HOME");

        assert_eq!(xdg_config_home(), PathBuf::from("/tmp/home/.config"));
        assert_eq!(xdg_data_home(), PathBuf::from("/tmp/home/.local/share"));

        env::set_var("XDG_DATA_HOME", "/tmp/data");
        assert_eq!(xdg_data_home(), PathBuf::from("/tmp/data"));
        env::remove_var("XDG_DATA_HOME");
    }
}
