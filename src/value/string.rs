use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// Shared, copy-on-write string used for every AWK string value.
///
/// Cloning only bumps a reference count. [`AwkStr::make_mut`] mutates in
/// place when the handle is the sole owner and copies otherwise.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AwkStr(Rc<String>);

impl AwkStr {
    pub fn new(s: impl Into<String>) -> Self {
        AwkStr(Rc::new(s.into()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Mutable access to the underlying buffer, copying it first if shared
    #[inline]
    pub fn make_mut(&mut self) -> &mut String {
        Rc::make_mut(&mut self.0)
    }

    /// True when another handle points at the same buffer
    pub fn is_shared(&self) -> bool {
        Rc::strong_count(&self.0) > 1
    }

    pub fn into_string(self) -> String {
        Rc::try_unwrap(self.0).unwrap_or_else(|rc| (*rc).clone())
    }

    /// Number of characters (not bytes)
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }
}

impl Deref for AwkStr {
    type Target = str;

    fn deref(&self) -> &str {
        self.0.as_str()
    }
}

impl Borrow<str> for AwkStr {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

impl AsRef<str> for AwkStr {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for AwkStr {
    fn from(s: String) -> Self {
        AwkStr(Rc::new(s))
    }
}

impl From<&str> for AwkStr {
    fn from(s: &str) -> Self {
        AwkStr(Rc::new(s.to_string()))
    }
}

impl fmt::Display for AwkStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for AwkStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}
