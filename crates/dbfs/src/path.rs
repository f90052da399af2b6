use crate::error::{Error, Result};
use std::fmt;

pub const SEP: char = '/';

/// A cleaned, root-relative path inside the store: no leading or trailing
/// separator, no `.` or `..` components. The store root is the empty path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Basepath(String);

impl Basepath {
    /// The store root
    #[must_use]
    pub fn root() -> Self {
        Basepath(String::new())
    }

    pub fn from<S: AsRef<str>>(path: S) -> Result<Self> {
        Ok(Basepath(clean(path.as_ref())?))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Directory part, empty for top level entries and for the root itself
    #[must_use]
    pub fn dir(&self) -> &str {
        match self.0.rfind(SEP) {
            Some(pos) => &self.0[..pos],
            None => "",
        }
    }

    /// Final component, empty for the root
    #[must_use]
    pub fn name(&self) -> &str {
        match self.0.rfind(SEP) {
            Some(pos) => &self.0[pos + 1..],
            None => &self.0,
        }
    }

    #[must_use]
    pub fn parent(&self) -> Option<Basepath> {
        if self.is_root() {
            None
        } else {
            Some(Basepath(self.dir().to_string()))
        }
    }

    /// Appends a relative path, cleaning the result
    pub fn join<S: AsRef<str>>(&self, rpath: S) -> Result<Basepath> {
        Basepath::from(join_rpath(&self.0, rpath.as_ref()))
    }
}

impl fmt::Display for Basepath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Basepath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalizes a path: strips separators at both ends, drops empty and `.`
/// components and resolves `..` against preceding components.
pub fn clean(path: &str) -> Result<String> {
    let mut components: Vec<&str> = Vec::new();
    for component in path.split(SEP) {
        match component {
            "" | "." => {}
            ".." => {
                if components.pop().is_none() {
                    return Err(Error::invalid_destination(path));
                }
            }
            name => components.push(name),
        }
    }
    Ok(components.join("/"))
}

/// Joins two relative paths without cleaning
#[must_use]
pub fn join_rpath(base: &str, rpath: &str) -> String {
    let rpath = rpath.trim_start_matches(SEP);
    if base.is_empty() {
        rpath.to_string()
    } else if rpath.is_empty() {
        base.to_string()
    } else {
        format!("{}{}{}", base.trim_end_matches(SEP), SEP, rpath)
    }
}

/// Splits a cleaned path into its directory and name parts
#[must_use]
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind(SEP) {
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => ("", path),
    }
}
