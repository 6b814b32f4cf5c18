// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

mod error;

#[cfg(test)]
#[path = "./name_test.rs"]
mod name_test;

pub use error::{Error, InvalidNameError, Result};

/// Separates a repository namespace from the package name, eg `builtin.zlib`
pub const NAMESPACE_SEP: char = '.';

/// Generate a borrowed and an owned type for a validated name string.
///
/// The borrowed type must provide an associated `validate` function.
macro_rules! name_types {
    ($borrowed:ident, $owned:ident, $what:literal) => {
        #[doc = concat!("A borrowed, validated ", $what, " name")]
        #[derive(Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
        #[repr(transparent)]
        pub struct $borrowed(str);

        #[doc = concat!("An owned, validated ", $what, " name")]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
        pub struct $owned(String);

        impl $borrowed {
            pub fn new(inner: &str) -> Result<&Self> {
                Self::validate(inner)?;
                // Safety: the name was just validated
                Ok(unsafe { Self::from_str_unchecked(inner) })
            }

            /// Wrap a str without validating it.
            ///
            /// # Safety
            ///
            /// The given string must already be a valid name.
            pub const unsafe fn from_str_unchecked(inner: &str) -> &Self {
                // Safety: the type is a transparent wrapper around str
                unsafe { &*(inner as *const str as *const $borrowed) }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl $owned {
            /// Consume the name, returning the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $borrowed {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::ops::Deref for $owned {
            type Target = $borrowed;

            fn deref(&self) -> &Self::Target {
                self.as_ref()
            }
        }

        impl AsRef<$borrowed> for $owned {
            fn as_ref(&self) -> &$borrowed {
                // Safety: owned instances are validated on construction
                unsafe { $borrowed::from_str_unchecked(&self.0) }
            }
        }

        impl AsRef<$borrowed> for $borrowed {
            fn as_ref(&self) -> &$borrowed {
                self
            }
        }

        impl AsRef<str> for $owned {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<$borrowed> for $owned {
            fn borrow(&self) -> &$borrowed {
                self.as_ref()
            }
        }

        impl std::borrow::ToOwned for $borrowed {
            type Owned = $owned;

            fn to_owned(&self) -> Self::Owned {
                $owned(self.0.to_owned())
            }
        }

        impl From<&$borrowed> for $owned {
            fn from(name: &$borrowed) -> Self {
                name.to_owned()
            }
        }

        impl From<$owned> for String {
            fn from(name: $owned) -> Self {
                name.0
            }
        }

        impl PartialEq<$borrowed> for $owned {
            fn eq(&self, other: &$borrowed) -> bool {
                self.as_str() == other.as_str()
            }
        }

        impl PartialEq<$owned> for $borrowed {
            fn eq(&self, other: &$owned) -> bool {
                self.as_str() == other.as_str()
            }
        }

        impl PartialEq<&$borrowed> for $owned {
            fn eq(&self, other: &&$borrowed) -> bool {
                self.as_str() == other.as_str()
            }
        }

        impl PartialEq<str> for $borrowed {
            fn eq(&self, other: &str) -> bool {
                &self.0 == other
            }
        }

        impl PartialEq<str> for $owned {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $owned {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::fmt::Display for $borrowed {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::fmt::Display for $owned {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $owned {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                $borrowed::new(s).map(ToOwned::to_owned)
            }
        }

        impl TryFrom<&str> for $owned {
            type Error = Error;

            fn try_from(s: &str) -> Result<Self> {
                s.parse()
            }
        }

        impl TryFrom<String> for $owned {
            type Error = Error;

            fn try_from(s: String) -> Result<Self> {
                $borrowed::validate(&s)?;
                Ok(Self(s))
            }
        }

        impl serde::Serialize for $borrowed {
            fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl serde::Serialize for $owned {
            fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $owned {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::try_from(s).map_err(serde::de::Error::custom)
            }
        }
    };
}

name_types!(PkgName, PkgNameBuf, "package");
name_types!(VariantName, VariantNameBuf, "variant");

/// Returns true if the character may appear in a name identifier.
pub fn is_legal_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Returns true if the character may start a name identifier.
pub fn is_legal_id_start(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn validate_id(name: &str, what: &'static str) -> Result<()> {
    let mut chars = name.chars();
    match chars.next() {
        None => {
            return Err(InvalidNameError::new_error(format!(
                "{what} name cannot be empty"
            )));
        }
        Some(c) if !is_legal_id_start(c) => {
            return Err(InvalidNameError::new_error(format!(
                "invalid {what} name '{name}': cannot start with '{c}'"
            )));
        }
        Some(_) => {}
    }
    if let Some(index) = name.find(|c| !is_legal_id_char(c)) {
        return Err(InvalidNameError::new_error(format!(
            "invalid {what} name '{name}': invalid character at position {index}"
        )));
    }
    Ok(())
}

impl PkgName {
    /// Names longer than this are rejected
    pub const MAX_LEN: usize = 128;

    /// Validate that a string is a legal package name
    ///
    /// A package name is an identifier made of letters, digits,
    /// `_` and `-`, optionally prefixed by one or more `.` separated
    /// namespace identifiers.
    pub fn validate(name: &str) -> Result<()> {
        if name.len() > Self::MAX_LEN {
            return Err(InvalidNameError::new_error(format!(
                "package name is too long ({} > {})",
                name.len(),
                Self::MAX_LEN
            )));
        }
        for part in name.split(NAMESPACE_SEP) {
            validate_id(part, "package")?;
        }
        Ok(())
    }

    /// The namespace portion of this name, if any
    pub fn namespace(&self) -> Option<&str> {
        self.0.rsplit_once(NAMESPACE_SEP).map(|(ns, _)| ns)
    }

    /// This name without any namespace prefix
    pub fn base_name(&self) -> &str {
        self.0
            .rsplit_once(NAMESPACE_SEP)
            .map(|(_, name)| name)
            .unwrap_or(&self.0)
    }
}

impl VariantName {
    pub fn validate(name: &str) -> Result<()> {
        validate_id(name, "variant")
    }
}

/// Parse a package name from a string literal, panicking when invalid.
///
/// Intended for tests and static names.
#[macro_export]
macro_rules! pkg_name {
    ($name:expr) => {
        $crate::name::PkgName::new($name).unwrap()
    };
}

/// Parse a variant name from a string literal, panicking when invalid.
#[macro_export]
macro_rules! variant_name {
    ($name:expr) => {
        $crate::name::VariantName::new($name).unwrap()
    };
}
