use std::{
	io,
	path::{Path, PathBuf},
	sync::Arc,
	time::Instant,
};

use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use uuid::Uuid;

use crate::route::post::model::{NewPost, Post, Reference};

/// An error while reading or writing the post store.
///
/// Every variant means the store is unavailable for the current request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("failed to access {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("{path} does not contain a valid post collection: {source}")]
	Corrupt {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},
	#[error("failed to serialize the post collection: {0}")]
	Serialize(#[source] serde_json::Error),
	#[error("post reference {0} cannot be incremented")]
	ReferencesExhausted(Reference),
}

/// The post collection, persisted as a single JSON array in one file.
///
/// Every append is a full read-modify-write of the file. Appends are
/// serialized by a single write lock, and each write replaces the file
/// through a rename, so readers never need the lock and always observe a
/// complete collection.
#[derive(Debug, Clone)]
pub struct Store {
	inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
	path: PathBuf,
	write: Mutex<()>,
}

impl Store {
	/// Opens the store at `path`, creating an empty collection if the file
	/// does not exist yet.
	pub async fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
		let path = path.into();

		let exists = fs::try_exists(&path).await.map_err(|source| Error::Io {
			path: path.clone(),
			source,
		})?;

		if !exists {
			tracing::info!(path = %path.display(), "creating empty post store");
			write_atomic(&path, b"[]").await?;
		}

		Ok(Self {
			inner: Arc::new(Inner {
				path,
				write: Mutex::new(()),
			}),
		})
	}

	pub fn path(&self) -> &Path {
		&self.inner.path
	}

	/// Reads the whole collection, in insertion order.
	pub async fn list(&self) -> Result<Vec<Post>, Error> {
		let path = self.path();
		let contents = fs::read(path).await.map_err(|source| Error::Io {
			path: path.to_owned(),
			source,
		})?;

		serde_json::from_slice(&contents).map_err(|source| Error::Corrupt {
			path: path.to_owned(),
			source,
		})
	}

	/// Stores a new post, assigning it the reference after the last stored
	/// post (or [`Reference::FIRST`] for an empty collection).
	pub async fn append(&self, candidate: NewPost) -> Result<Post, Error> {
		let _guard = self.inner.write.lock().await;
		let started = Instant::now();

		let mut posts = self.list().await?;
		let reference = match posts.last() {
			Some(last) => last
				.reference
				.next()
				.ok_or(Error::ReferencesExhausted(last.reference))?,
			None => Reference::FIRST,
		};

		let post = candidate.into_model(reference);
		posts.push(post.clone());

		let contents = serde_json::to_vec_pretty(&posts).map_err(Error::Serialize)?;
		write_atomic(self.path(), &contents).await?;

		#[allow(clippy::cast_possible_truncation)]
		let elapsed = started.elapsed().as_millis() as u64;

		tracing::info!(
			histogram.latency_ms = elapsed,
			reference = reference.get(),
			posts = posts.len(),
			"appended post"
		);

		Ok(post)
	}
}

/// Replaces the contents of `path` with `contents`.
///
/// The bytes are written and synced to a uniquely named temporary file in
/// the same directory, which is then renamed over `path`.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), Error> {
	let io_error = |source| Error::Io {
		path: path.to_owned(),
		source,
	};

	let directory = match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent.to_owned(),
		_ => PathBuf::from("."),
	};

	fs::create_dir_all(&directory).await.map_err(io_error)?;

	let file_name = path
		.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_default();
	let temp_path = directory.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

	let result = async {
		let mut file = fs::File::create(&temp_path).await?;

		file.write_all(contents).await?;
		file.sync_all().await?;
		drop(file);

		fs::rename(&temp_path, path).await
	}
	.await;

	if let Err(source) = result {
		// the temp file is useless once the rename did not happen
		let _ = fs::remove_file(&temp_path).await;

		return Err(io_error(source));
	}

	Ok(())
}
