use crate::constants::PATH_SEPARATOR;
use crate::CoordinationError;
use crate::Result;

/// Subtree path of an interface: dots in the interface name become path
/// segments, e.g. `com.acme.Greeter` under `/osgi/service_registry` maps to
/// `/osgi/service_registry/com/acme/Greeter`.
pub fn interface_path(
    root: &str,
    interface_name: &str,
) -> String {
    let root = root.trim_end_matches(PATH_SEPARATOR);
    let relative = interface_name.replace('.', "/");
    format!("{root}/{relative}")
}

pub fn child_path(
    parent: &str,
    child: &str,
) -> String {
    if parent == "/" {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

/// Parent path, `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind(PATH_SEPARATOR) {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of a path.
pub fn node_name(path: &str) -> &str {
    path.rsplit(PATH_SEPARATOR).next().unwrap_or(path)
}

/// Absolute, no trailing separator (except the root itself), no empty
/// segments.
pub fn validate_path(path: &str) -> Result<()> {
    let valid = path == "/"
        || (path.starts_with(PATH_SEPARATOR)
            && !path.ends_with(PATH_SEPARATOR)
            && !path[1..].split(PATH_SEPARATOR).any(str::is_empty));
    if valid {
        Ok(())
    } else {
        Err(CoordinationError::InvalidPath(path.to_string()).into())
    }
}
