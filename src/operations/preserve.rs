//! Metadata preservation descriptor.

use std::ops::{BitOr, BitOrAssign};

use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::error::{Result, TinifyError};

/// Set of metadata kinds to carry over into the optimized image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PreserveOptions(u8);

impl PreserveOptions {
    pub const NONE: Self = Self(0);
    /// Copyright EXIF/XMP fields.
    pub const COPYRIGHT: Self = Self(1 << 0);
    /// Creation date.
    pub const CREATION: Self = Self(1 << 1);
    /// GPS location.
    pub const LOCATION: Self = Self(1 << 2);
    pub const ALL: Self = Self(0b111);

    /// Whether every flag in `other` is set.
    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Wire names in fixed order: copyright, creation, location.
    pub fn names(self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(3);
        if self.contains(Self::COPYRIGHT) {
            names.push("copyright");
        }
        if self.contains(Self::CREATION) {
            names.push("creation");
        }
        if self.contains(Self::LOCATION) {
            names.push("location");
        }
        names
    }
}

impl BitOr for PreserveOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PreserveOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Validated `preserve` section, serialized as a list of names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreserveOperation {
    options: PreserveOptions,
}

impl PreserveOperation {
    /// Build from a non-empty option set.
    pub fn new(options: PreserveOptions) -> Result<Self> {
        if options.is_empty() {
            return Err(TinifyError::InvalidOperation(
                "preserve needs at least one metadata kind".to_string(),
            ));
        }
        Ok(Self { options })
    }

    #[inline]
    pub fn options(&self) -> PreserveOptions {
        self.options
    }
}

impl Serialize for PreserveOperation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let names = self.options.names();
        let mut seq = serializer.serialize_seq(Some(names.len()))?;
        for name in names {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}
