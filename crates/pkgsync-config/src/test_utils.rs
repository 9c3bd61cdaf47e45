use std::env;

/// Runs `f` with the given variables set (`Some`) or removed (`None`), then
/// restores their previous values.
pub fn with_env<F>(vars: &[(&str, Option<&str>)], f: F)
where
    F: FnOnce(),
{
    let saved: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

    for (key, value) in vars {
        match value {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
    }

    f();

    for (key, previous) in saved {
        match previous {
            Some(v) => env::set_var(key, v),
            None => env::remove_var(key),
        }
    }
}
