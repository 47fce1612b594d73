//! Normalization of uploaded post images.
//!
//! Uploads arrive already filtered (JPEG only, at most [`MAX_IMAGE_BYTES`]).
//! The pipeline checks the shape of the image set, resizes every image to
//! [`TARGET_WIDTH`] and re-encodes it at [`JPEG_QUALITY`], writing the result
//! under the public image directory.

use std::{
	collections::HashSet,
	io::Cursor,
	path::{Path, PathBuf},
};

use axum::body::Bytes;
use image::{
	codecs::jpeg::JpegEncoder,
	imageops::FilterType,
	io::{Limits, Reader},
	ColorType, GenericImageView, ImageFormat,
};
use tokio::task::JoinSet;

use crate::{image_root::ImageRoot, route::post::model::Violation, store};

pub const TARGET_WIDTH: u32 = 500;
pub const JPEG_QUALITY: u8 = 75;
pub const MAX_IMAGE_BYTES: usize = 1024 * 1024;
pub const MAX_ADDITIONAL_IMAGES: usize = 5;
/// Largest width or height accepted from an upload.
pub const MAX_SOURCE_SIDE: u32 = 10_000;
/// Tallest image [`normalize`] produces.
pub const MAX_TARGET_HEIGHT: u32 = 10_000;
const MAX_DECODE_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("failed to process {file}: {source}")]
	Normalize {
		file: String,
		#[source]
		source: NormalizeError,
	},
	#[error("{0:?} is not a usable image file name")]
	FileName(String),
	#[error("failed to write image: {0}")]
	Write(#[from] store::Error),
	#[error("image task failed: {0}")]
	Task(#[from] tokio::task::JoinError),
}

/// Why a single image could not be normalized.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
	#[error(transparent)]
	Image(#[from] image::ImageError),
	#[error("a {width}x{height} image would be {target} pixels tall, more than {MAX_TARGET_HEIGHT}")]
	TooTall { width: u32, height: u32, target: u32 },
}

/// An uploaded image that passed the upload filter.
#[derive(Debug, Clone)]
pub struct Upload {
	pub file_name: String,
	pub bytes: Bytes,
}

/// The images of a post creation request, as received.
#[derive(Debug, Default)]
pub struct Candidates {
	pub main: Vec<Upload>,
	pub additional: Vec<Upload>,
}

/// A checked image set: exactly one main image and at most
/// [`MAX_ADDITIONAL_IMAGES`] additional ones.
#[derive(Debug)]
pub struct ImageSet {
	pub main: Upload,
	pub additional: Vec<Upload>,
}

/// Public paths of the normalized images, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImages {
	pub main: String,
	pub additional: Vec<String>,
}

impl Candidates {
	pub fn validate(self) -> Result<ImageSet, Violation> {
		let mut main = self.main.into_iter();

		let Some(first) = main.next() else {
			return Err(Violation::MainImageMissing);
		};

		if main.next().is_some() {
			return Err(Violation::MainImageRepeated);
		}

		if self.additional.len() > MAX_ADDITIONAL_IMAGES {
			return Err(Violation::TooManyAdditionalImages);
		}

		let mut names = HashSet::new();

		for upload in std::iter::once(&first).chain(&self.additional) {
			let name = Path::new(&upload.file_name).file_name();

			if !names.insert(name.map(ToOwned::to_owned)) {
				return Err(Violation::DuplicateImageName(upload.file_name.clone()));
			}
		}

		Ok(ImageSet {
			main: first,
			additional: self.additional,
		})
	}
}

/// Resizes `bytes` to [`TARGET_WIDTH`] pixels wide, keeping the aspect
/// ratio, and re-encodes it as a JPEG at [`JPEG_QUALITY`].
///
/// Sources wider or taller than [`MAX_SOURCE_SIDE`] are not decoded, and
/// results taller than [`MAX_TARGET_HEIGHT`] are refused before resizing.
///
/// This is CPU-bound, so async callers should go through [`Pipeline::store`].
pub fn normalize(bytes: &[u8]) -> Result<Vec<u8>, NormalizeError> {
	let mut limits = Limits::default();
	limits.max_image_width = Some(MAX_SOURCE_SIDE);
	limits.max_image_height = Some(MAX_SOURCE_SIDE);
	limits.max_alloc = Some(MAX_DECODE_BYTES);

	let mut reader = Reader::with_format(Cursor::new(bytes), ImageFormat::Jpeg);
	reader.limits(limits);

	let decoded = reader.decode()?;
	let (width, height) = decoded.dimensions();
	let target = target_height(width, height);

	if target > MAX_TARGET_HEIGHT {
		return Err(NormalizeError::TooTall {
			width,
			height,
			target,
		});
	}

	let height = target;

	let resized = decoded
		.resize_exact(TARGET_WIDTH, height, FilterType::Lanczos3)
		.to_rgb8();

	let mut output = Cursor::new(Vec::new());
	JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY).encode(
		resized.as_raw(),
		resized.width(),
		resized.height(),
		ColorType::Rgb8,
	)?;

	Ok(output.into_inner())
}

fn target_height(width: u32, height: u32) -> u32 {
	let scaled = u64::from(height) * u64::from(TARGET_WIDTH);
	let width = u64::from(width.max(1));

	// rounded division, clamped to at least one row
	u32::try_from((scaled + width / 2) / width)
		.unwrap_or(u32::MAX)
		.max(1)
}

/// Writes normalized images into the public image directory.
#[derive(Debug, Clone)]
pub struct Pipeline {
	root: ImageRoot,
}

impl Pipeline {
	pub fn new(root: ImageRoot) -> Self {
		Self { root }
	}

	/// Normalizes one upload on the blocking pool and writes it to the
	/// location derived from its file name, returning its public path.
	pub async fn store(&self, upload: Upload) -> Result<String, Error> {
		let (public_path, location): (String, PathBuf) = self
			.root
			.locate(&upload.file_name)
			.ok_or_else(|| Error::FileName(upload.file_name.clone()))?;

		let normalized = tokio::task::spawn_blocking(move || normalize_upload(&upload)).await??;

		write(&public_path, &location, &normalized).await?;

		Ok(public_path)
	}

	/// Normalizes every image of the set concurrently, then writes them.
	///
	/// Nothing is written unless every image normalizes. The first failure
	/// cancels the remaining work.
	pub async fn store_all(&self, images: ImageSet) -> Result<StoredImages, Error> {
		let uploads = std::iter::once(images.main)
			.chain(images.additional)
			.collect::<Vec<_>>();

		let mut targets = Vec::with_capacity(uploads.len());
		let mut tasks = JoinSet::new();

		for (index, upload) in uploads.into_iter().enumerate() {
			targets.push(
				self.root
					.locate(&upload.file_name)
					.ok_or_else(|| Error::FileName(upload.file_name.clone()))?,
			);

			tasks.spawn_blocking(move || (index, normalize_upload(&upload)));
		}

		let mut normalized = vec![Vec::new(); targets.len()];

		while let Some(joined) = tasks.join_next().await {
			let (index, result) = joined?;

			normalized[index] = result?;
		}

		let mut paths = Vec::with_capacity(targets.len());

		for ((public_path, location), bytes) in targets.into_iter().zip(normalized) {
			write(&public_path, &location, &bytes).await?;
			paths.push(public_path);
		}

		let main = paths.remove(0);

		Ok(StoredImages {
			main,
			additional: paths,
		})
	}
}

fn normalize_upload(upload: &Upload) -> Result<Vec<u8>, Error> {
	normalize(&upload.bytes).map_err(|source| Error::Normalize {
		file: upload.file_name.clone(),
		source,
	})
}

async fn write(public_path: &str, location: &Path, bytes: &[u8]) -> Result<(), Error> {
	store::write_atomic(location, bytes).await?;

	tracing::debug!(path = %public_path, size = bytes.len(), "stored image");

	Ok(())
}
