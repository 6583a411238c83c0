//! Validated logical area names used as storage keys and path segments.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const IDENTIFIER_MAX_LEN: usize = 128;
const STORAGE_PREFIX: &str = "area/";

/// Error returned when area name validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The name was empty.
	#[error("Area name cannot be empty.")]
	Empty,
	/// The name contains a character outside `[A-Za-z0-9_.@-]`.
	#[error("Area name contains the invalid character {ch:?}.")]
	InvalidCharacter {
		/// Offending character.
		ch: char,
	},
	/// The name starts or ends with `-`, `.`, or `@`.
	#[error("Area name must start and end with a letter, digit, or underscore.")]
	InvalidBoundary,
	/// The name exceeded the allowed character count.
	#[error("Area name exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
}

/// Logical name an operator registers credentials under, e.g. `prod-ci_cd-pipeline`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AreaName(String);
impl AreaName {
	/// Creates a new area name after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let view = value.as_ref();

		validate_view(view)?;

		Ok(Self(view.to_owned()))
	}

	/// Storage key holding this area's credential record.
	pub fn storage_path(&self) -> String {
		format!("{STORAGE_PREFIX}{}", self.0)
	}

	/// Recovers the area name from a storage key produced by [`AreaName::storage_path`].
	pub fn from_storage_path(path: &str) -> Result<Self, IdentifierError> {
		Self::new(path.strip_prefix(STORAGE_PREFIX).unwrap_or(path))
	}
}
impl Deref for AreaName {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for AreaName {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for AreaName {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<AreaName> for String {
	fn from(value: AreaName) -> Self {
		value.0
	}
}
impl TryFrom<String> for AreaName {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_view(&value)?;

		Ok(Self(value))
	}
}
impl Debug for AreaName {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Area({})", self.0)
	}
}
impl Display for AreaName {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl FromStr for AreaName {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

fn is_word(ch: char) -> bool {
	ch.is_ascii_alphanumeric() || ch == '_'
}

fn validate_view(view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty);
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { max: IDENTIFIER_MAX_LEN });
	}
	if let Some(ch) = view.chars().find(|&ch| !is_word(ch) && !matches!(ch, '-' | '.' | '@')) {
		return Err(IdentifierError::InvalidCharacter { ch });
	}

	let first = view.chars().next().is_some_and(is_word);
	let last = view.chars().next_back().is_some_and(is_word);

	if !(first && last) {
		return Err(IdentifierError::InvalidBoundary);
	}

	Ok(())
}
