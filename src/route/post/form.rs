use std::path::Path;

use axum::{
	body::Bytes,
	extract::{multipart::Field, Multipart},
};
use chrono::{DateTime, Utc};

use crate::pipeline::{Candidates, ImageSet, Upload, MAX_IMAGE_BYTES};

use super::{
	model::{PostDraft, PostFields, Violation},
	Error, RouteError,
};

const ACCEPTED_EXTENSIONS: [&str; 2] = ["jpg", "jpeg"];

/// A post creation form, read in full but not yet validated.
#[derive(Debug, Default)]
pub struct Form {
	pub fields: PostFields,
	pub images: Candidates,
	/// The first field name outside of the form, if any.
	pub unknown: Option<String>,
}

impl Form {
	/// Reads every part of `multipart`, passing uploads through the upload
	/// filter as they arrive.
	pub async fn read(mut multipart: Multipart) -> Result<Self, RouteError> {
		let mut form = Self::default();

		while let Some(field) = multipart.next_field().await? {
			let name = field.name().unwrap_or_default().to_owned();

			match name.as_str() {
				"title" => form.fields.title = Some(field.text().await?),
				"description" => form.fields.description = Some(field.text().await?),
				"date_time" => form.fields.date_time = Some(field.text().await?),
				"main_image" => form.images.main.push(upload(field).await?),
				"additional_images" => form.images.additional.push(upload(field).await?),
				_ => {
					form.unknown.get_or_insert(name);
				}
			}
		}

		Ok(form)
	}

	/// Checks the image set, then the field names, then every text field.
	pub fn validate(self, now: DateTime<Utc>) -> Result<(ImageSet, PostDraft), Violation> {
		let images = self.images.validate()?;

		if let Some(field) = self.unknown {
			return Err(Violation::UnknownField(field));
		}

		Ok((images, self.fields.validate(now)?))
	}
}

/// Keeps only the final component of a client-supplied file name.
fn base_name(file_name: &str) -> Option<&str> {
	Path::new(file_name).file_name()?.to_str()
}

fn is_jpeg(file_name: &str) -> bool {
	Path::new(file_name)
		.extension()
		.and_then(|extension| extension.to_str())
		.is_some_and(|extension| {
			ACCEPTED_EXTENSIONS
				.iter()
				.any(|accepted| extension.eq_ignore_ascii_case(accepted))
		})
}

/// Buffers one uploaded file, rejecting it as soon as it breaks a limit.
async fn upload(mut field: Field<'_>) -> Result<Upload, RouteError> {
	let file_name = field
		.file_name()
		.and_then(base_name)
		.filter(|name| is_jpeg(name))
		.ok_or(Error::UnsupportedImage)?
		.to_owned();

	let mut bytes = Vec::new();

	while let Some(chunk) = field.chunk().await? {
		if bytes.len() + chunk.len() > MAX_IMAGE_BYTES {
			return Err(Error::ImageTooLarge(file_name).into());
		}

		bytes.extend_from_slice(&chunk);
	}

	Ok(Upload {
		file_name,
		bytes: Bytes::from(bytes),
	})
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_only_jpeg_names_pass() {
		for name in ["photo.jpg", "photo.JPG", "photo.jpeg", "archive.tar.JpEg"] {
			assert!(is_jpeg(name), "{name} should pass");
		}

		for name in ["photo.png", "photo", "jpg", ".jpg", "photo.jpg.exe", ""] {
			assert!(!is_jpeg(name), "{name} should be rejected");
		}
	}

	#[test]
	fn test_base_name_drops_directories() {
		assert_eq!(base_name("../../etc/photo.jpg"), Some("photo.jpg"));
		assert_eq!(base_name("photo.jpg"), Some("photo.jpg"));
		assert_eq!(base_name(".."), None);
	}

	#[test]
	fn test_images_are_checked_before_fields() {
		let form = Form {
			unknown: Some("author".into()),
			..Form::default()
		};

		assert_eq!(
			form.validate(Utc::now()).unwrap_err(),
			Violation::MainImageMissing
		);
	}

	#[test]
	fn test_unknown_field_is_checked_before_text_fields() {
		let form = Form {
			images: Candidates {
				main: vec![Upload {
					file_name: "main.jpg".into(),
					bytes: Bytes::new(),
				}],
				additional: Vec::new(),
			},
			unknown: Some("author".into()),
			..Form::default()
		};

		assert_eq!(
			form.validate(Utc::now()).unwrap_err(),
			Violation::UnknownField("author".into())
		);
	}
}
