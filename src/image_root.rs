use std::{
	io,
	path::{Component, Path, PathBuf},
	sync::Arc,
};

/// The directory, relative to the content root, holding public images.
pub const IMAGE_DIR: &str = "images";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
	#[error("path {0:?} is empty")]
	Empty(String),
	#[error("path {0:?} leaves the image directory")]
	Escapes(String),
}

/// Maps public image paths (`images/<file>`) to files under a content root.
#[derive(Debug, Clone)]
pub struct ImageRoot {
	root: Arc<PathBuf>,
}

impl ImageRoot {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self {
			root: Arc::new(root.into()),
		}
	}

	/// The directory normalized images are written to.
	pub fn directory(&self) -> PathBuf {
		self.root.join(IMAGE_DIR)
	}

	/// The public path and file location for an image named `file_name`.
	///
	/// Only the final component of `file_name` is kept.
	pub fn locate(&self, file_name: &str) -> Option<(String, PathBuf)> {
		let name = Path::new(file_name).file_name()?.to_str()?;

		Some((format!("{IMAGE_DIR}/{name}"), self.directory().join(name)))
	}

	/// Resolves a public path to a file location inside the image directory.
	///
	/// The path must be relative, made only of plain components and start
	/// with the image directory. Symbolic links are not followed here, see
	/// [`ImageRoot::contains`].
	pub fn resolve(&self, requested: &str) -> Result<PathBuf, PathError> {
		if requested.is_empty() {
			return Err(PathError::Empty(requested.to_owned()));
		}

		let mut components = Vec::new();

		for component in Path::new(requested).components() {
			match component {
				Component::Normal(part) => components.push(part),
				Component::CurDir => {}
				Component::ParentDir | Component::RootDir | Component::Prefix(..) => {
					return Err(PathError::Escapes(requested.to_owned()));
				}
			}
		}

		match components.as_slice() {
			[dir, _, ..] if *dir == IMAGE_DIR => {
				Ok(components.iter().fold((*self.root).clone(), |path, part| path.join(part)))
			}
			_ => Err(PathError::Escapes(requested.to_owned())),
		}
	}

	/// Whether `path`, once every symbolic link is resolved, still lies
	/// inside the image directory. Missing files yield `NotFound`.
	pub async fn contains(&self, path: &Path) -> io::Result<bool> {
		let directory = tokio::fs::canonicalize(self.directory()).await?;
		let path = tokio::fs::canonicalize(path).await?;

		Ok(path.starts_with(directory))
	}

	/// Whether `requested` names an existing file inside the image directory.
	pub async fn exists(&self, requested: &str) -> bool {
		let Ok(path) = self.resolve(requested) else {
			return false;
		};

		match tokio::fs::metadata(&path).await {
			Ok(metadata) if metadata.is_file() => self.contains(&path).await.unwrap_or(false),
			_ => false,
		}
	}
}
