use std::{fmt, num::ParseIntError, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use macros::model;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize, Serializer};

use crate::{pipeline::StoredImages, slug};

pub const TITLE_MIN_LENGTH: usize = 5;
pub const TITLE_MAX_LENGTH: usize = 50;
pub const DESCRIPTION_MAX_LENGTH: usize = 500;
pub const FORBIDDEN_TITLE_CHARACTERS: [char; 4] = ['<', '>', '{', '}'];

/// The zero-padded sequential reference of a stored post, e.g. `00001`.
///
/// Formatting pads to five digits and grows beyond that once the
/// sequence passes `99999`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reference(u64);

impl Reference {
	pub const FIRST: Self = Self(1);

	pub fn new(value: u64) -> Self {
		Self(value)
	}

	pub fn get(self) -> u64 {
		self.0
	}

	/// The reference following this one, or `None` if the sequence is exhausted.
	pub fn next(self) -> Option<Self> {
		self.0.checked_add(1).map(Self)
	}
}

impl fmt::Display for Reference {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:05}", self.0)
	}
}

impl FromStr for Reference {
	type Err = ParseIntError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		s.parse().map(Self)
	}
}

impl TryFrom<String> for Reference {
	type Error = ParseIntError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<Reference> for String {
	fn from(reference: Reference) -> Self {
		reference.to_string()
	}
}

impl JsonSchema for Reference {
	fn schema_name() -> String {
		"Reference".into()
	}

	fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
		String::json_schema(gen)
	}
}

/// A single blog post, as persisted in the post store.
#[model]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct Post {
	/// The sequential reference assigned when the post was stored.
	#[generated]
	pub reference: Reference,
	/// The title of the post.
	pub title: String,
	/// The body of the post.
	pub description: String,
	/// Relative path of the normalized main image.
	pub main_image: String,
	/// Relative paths of the normalized additional images, if any were uploaded.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub additional_images: Option<Vec<String>>,
	/// The scheduled publication time, in milliseconds since the Unix epoch.
	pub date_time: i64,
}

/// A post as presented to clients, with its derived fields.
#[derive(Debug, Serialize, JsonSchema)]
pub struct PostView {
	pub reference: Reference,
	pub title: String,
	pub description: String,
	pub main_image: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub additional_images: Option<Vec<String>>,
	/// The scheduled publication time as an ISO-8601 UTC string.
	#[serde(serialize_with = "iso_millis")]
	pub date_time: DateTime<Utc>,
	/// A URL-safe form of the title, recomputed on every read.
	pub title_slug: String,
}

fn iso_millis<S: Serializer>(date_time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
	serializer.serialize_str(&date_time.to_rfc3339_opts(SecondsFormat::Millis, true))
}

impl From<Post> for PostView {
	fn from(post: Post) -> Self {
		Self {
			title_slug: slug::slugify(&post.title),
			date_time: DateTime::from_timestamp_millis(post.date_time).unwrap_or_default(),
			reference: post.reference,
			title: post.title,
			description: post.description,
			main_image: post.main_image,
			additional_images: post.additional_images,
		}
	}
}

/// A rule broken by a post creation request.
///
/// The messages are presented to the client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
	#[error("\"main_image\" is required")]
	MainImageMissing,
	#[error("\"main_image\" must contain at most 1 file")]
	MainImageRepeated,
	#[error("\"additional_images\" must contain less than or equal to 5 items")]
	TooManyAdditionalImages,
	#[error("\"additional_images\" contains a duplicate file name {0:?}")]
	DuplicateImageName(String),
	#[error("\"{0}\" is not allowed")]
	UnknownField(String),
	#[error("\"title\" is required")]
	TitleMissing,
	#[error("\"title\" is not allowed to be empty")]
	TitleEmpty,
	#[error("\"title\" length must be at least 5 characters long")]
	TitleTooShort,
	#[error("\"title\" length must be less than or equal to 50 characters long")]
	TitleTooLong,
	#[error("Post title cannot contain special characters")]
	TitleSpecialCharacters,
	#[error("\"description\" is required")]
	DescriptionMissing,
	#[error("\"description\" is not allowed to be empty")]
	DescriptionEmpty,
	#[error("\"description\" length must be less than or equal to 500 characters long")]
	DescriptionTooLong,
	#[error("\"date_time\" is required")]
	DateMissing,
	#[error("\"date_time\" must be a number")]
	DateNotANumber,
	#[error("\"date_time\" must be a valid timestamp")]
	DateOutOfRange,
	#[error("Cannot choose a date in the past")]
	DateInPast,
}

impl Violation {
	/// The request field the violation refers to.
	pub fn field(&self) -> &str {
		match self {
			Self::MainImageMissing | Self::MainImageRepeated => "main_image",
			Self::TooManyAdditionalImages | Self::DuplicateImageName(..) => "additional_images",
			Self::UnknownField(field) => field,
			Self::TitleMissing
			| Self::TitleEmpty
			| Self::TitleTooShort
			| Self::TitleTooLong
			| Self::TitleSpecialCharacters => "title",
			Self::DescriptionMissing | Self::DescriptionEmpty | Self::DescriptionTooLong => {
				"description"
			}
			Self::DateMissing | Self::DateNotANumber | Self::DateOutOfRange | Self::DateInPast => {
				"date_time"
			}
		}
	}
}

pub fn validate_title(title: Option<&str>) -> Result<(), Violation> {
	let title = title.ok_or(Violation::TitleMissing)?;
	let length = title.chars().count();

	if length == 0 {
		return Err(Violation::TitleEmpty);
	}

	if length < TITLE_MIN_LENGTH {
		return Err(Violation::TitleTooShort);
	}

	if length > TITLE_MAX_LENGTH {
		return Err(Violation::TitleTooLong);
	}

	if title.contains(&FORBIDDEN_TITLE_CHARACTERS[..]) {
		return Err(Violation::TitleSpecialCharacters);
	}

	Ok(())
}

pub fn validate_description(description: Option<&str>) -> Result<(), Violation> {
	let description = description.ok_or(Violation::DescriptionMissing)?;

	if description.is_empty() {
		return Err(Violation::DescriptionEmpty);
	}

	if description.chars().count() > DESCRIPTION_MAX_LENGTH {
		return Err(Violation::DescriptionTooLong);
	}

	Ok(())
}

/// Parses the raw `date_time` field and rejects dates before `now`.
pub fn validate_date_time(date_time: Option<&str>, now: DateTime<Utc>) -> Result<i64, Violation> {
	let millis = date_time
		.ok_or(Violation::DateMissing)?
		.trim()
		.parse::<i64>()
		.map_err(|_| Violation::DateNotANumber)?;

	DateTime::from_timestamp_millis(millis).ok_or(Violation::DateOutOfRange)?;

	if millis < now.timestamp_millis() {
		return Err(Violation::DateInPast);
	}

	Ok(millis)
}

/// The text fields of a post creation request, before validation.
#[derive(Debug, Default)]
pub struct PostFields {
	pub title: Option<String>,
	pub description: Option<String>,
	pub date_time: Option<String>,
}

/// Validated text fields, waiting for their images.
#[derive(Debug)]
pub struct PostDraft {
	pub title: String,
	pub description: String,
	pub date_time: i64,
}

impl PostFields {
	/// Applies every field rule in order, reporting the first violation.
	pub fn validate(self, now: DateTime<Utc>) -> Result<PostDraft, Violation> {
		validate_title(self.title.as_deref())?;
		validate_description(self.description.as_deref())?;
		let date_time = validate_date_time(self.date_time.as_deref(), now)?;

		Ok(PostDraft {
			title: self.title.unwrap_or_default(),
			description: self.description.unwrap_or_default(),
			date_time,
		})
	}
}

impl PostDraft {
	pub fn with_images(self, images: StoredImages) -> NewPost {
		NewPost {
			title: self.title,
			description: self.description,
			main_image: images.main,
			additional_images: (!images.additional.is_empty()).then_some(images.additional),
			date_time: self.date_time,
		}
	}
}

#[cfg(test)]
mod test {
	use chrono::Duration;

	use super::*;

	fn fields(title: &str) -> PostFields {
		PostFields {
			title: Some(title.into()),
			description: Some("This is a blog meant for testing".into()),
			date_time: Some((Utc::now() + Duration::days(1)).timestamp_millis().to_string()),
		}
	}

	fn sample(reference: u64) -> Post {
		NewPost {
			title: "Café Déjà Vu!".into(),
			description: "A post".into(),
			main_image: "images/cafe.jpg".into(),
			additional_images: None,
			date_time: 1_735_000_000_000,
		}
		.into_model(Reference::new(reference))
	}

	#[test]
	fn test_reference_is_zero_padded() {
		assert_eq!(Reference::FIRST.to_string(), "00001");
		assert_eq!(Reference::new(42).to_string(), "00042");
		assert_eq!(Reference::new(123_456).to_string(), "123456");
	}

	#[test]
	fn test_reference_next() {
		assert_eq!(Reference::new(9).next(), Some(Reference::new(10)));
		assert_eq!(Reference::new(u64::MAX).next(), None);
	}

	#[test]
	fn test_reference_serializes_as_string() {
		let value = serde_json::to_value(Reference::new(7)).unwrap();

		assert_eq!(value, "00007");
		assert_eq!(
			serde_json::from_value::<Reference>(value).unwrap(),
			Reference::new(7)
		);
		assert!(serde_json::from_value::<Reference>("abc".into()).is_err());
	}

	#[test]
	fn test_post_omits_missing_additional_images() {
		let value = serde_json::to_value(sample(1)).unwrap();

		assert_eq!(value["reference"], "00001");
		assert!(value.get("additional_images").is_none());
	}

	#[test]
	fn test_view_derives_slug_and_iso_date() {
		let view = PostView::from(sample(3));
		let value = serde_json::to_value(&view).unwrap();

		assert_eq!(value["title_slug"], "cafe-deja-vu");
		assert_eq!(value["date_time"], "2024-12-24T00:26:40.000Z");
		assert_eq!(value["reference"], "00003");
	}

	#[test]
	fn test_title_rules() {
		assert_eq!(validate_title(None), Err(Violation::TitleMissing));
		assert_eq!(validate_title(Some("")), Err(Violation::TitleEmpty));
		assert_eq!(validate_title(Some("AB")), Err(Violation::TitleTooShort));
		assert_eq!(
			validate_title(Some(&"x".repeat(51))),
			Err(Violation::TitleTooLong)
		);
		assert_eq!(
			validate_title(Some("{}A test blog post<>")),
			Err(Violation::TitleSpecialCharacters)
		);
		assert_eq!(validate_title(Some("A valid title")), Ok(()));
		assert_eq!(validate_title(Some(&"é".repeat(50))), Ok(()));
	}

	#[test]
	fn test_description_rules() {
		assert_eq!(
			validate_description(None),
			Err(Violation::DescriptionMissing)
		);
		assert_eq!(
			validate_description(Some("")),
			Err(Violation::DescriptionEmpty)
		);
		assert_eq!(
			validate_description(Some(&"a".repeat(501))),
			Err(Violation::DescriptionTooLong)
		);
		assert_eq!(validate_description(Some(&"a".repeat(500))), Ok(()));
	}

	#[test]
	fn test_date_rules() {
		let now = Utc::now();
		let past = (now - Duration::seconds(1)).timestamp_millis().to_string();
		let future = (now + Duration::minutes(1)).timestamp_millis();

		assert_eq!(validate_date_time(None, now), Err(Violation::DateMissing));
		assert_eq!(
			validate_date_time(Some("tomorrow"), now),
			Err(Violation::DateNotANumber)
		);
		assert_eq!(
			validate_date_time(Some(&i64::MAX.to_string()), now),
			Err(Violation::DateOutOfRange)
		);
		assert_eq!(
			validate_date_time(Some(&past), now),
			Err(Violation::DateInPast)
		);
		assert_eq!(
			validate_date_time(Some(&future.to_string()), now),
			Ok(future)
		);
		assert_eq!(
			validate_date_time(Some(&now.timestamp_millis().to_string()), now),
			Ok(now.timestamp_millis())
		);
	}

	#[test]
	fn test_first_violation_wins() {
		let mut input = fields("");
		input.date_time = Some("0".into());

		assert_eq!(input.validate(Utc::now()).unwrap_err(), Violation::TitleEmpty);
	}

	#[test]
	fn test_violation_messages() {
		assert_eq!(
			Violation::TitleEmpty.to_string(),
			"\"title\" is not allowed to be empty"
		);
		assert_eq!(
			Violation::TitleSpecialCharacters.to_string(),
			"Post title cannot contain special characters"
		);
		assert_eq!(
			Violation::DateInPast.to_string(),
			"Cannot choose a date in the past"
		);
		assert_eq!(Violation::DateInPast.field(), "date_time");
	}

	#[test]
	fn test_draft_never_stores_empty_additional_images() {
		let draft = fields("A valid title").validate(Utc::now()).unwrap();
		let post = draft.with_images(StoredImages {
			main: "images/main.jpg".into(),
			additional: Vec::new(),
		});

		assert_eq!(post.additional_images, None);
		assert_eq!(post.main_image, "images/main.jpg");
	}
}
