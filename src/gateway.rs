use std::io;

use crate::{
	image_root::ImageRoot,
	token::{TokenService, Unauthorized},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("token rejected: {0}")]
	Forbidden(#[from] Unauthorized),
	#[error("{0:?} does not name a stored image")]
	NotFound(String),
	#[error("failed to read {path:?}: {source}")]
	Io {
		path: String,
		#[source]
		source: io::Error,
	},
}

/// Releases the bytes of a protected image to holders of a token bound to
/// its exact path.
#[derive(Debug, Clone)]
pub struct Gateway {
	tokens: TokenService,
	root: ImageRoot,
}

impl Gateway {
	pub fn new(tokens: TokenService, root: ImageRoot) -> Self {
		Self { tokens, root }
	}

	/// Verifies `token` for `requested`, then reads the file it names.
	///
	/// Paths that leave the image directory, either lexically or through a
	/// symbolic link, are treated as missing.
	pub async fn fetch(&self, token: &str, requested: &str) -> Result<Vec<u8>, Error> {
		self.tokens.verify(token, requested)?;

		let not_found = || Error::NotFound(requested.to_owned());
		let path = self.root.resolve(requested).map_err(|_| not_found())?;

		let io_error = |source| Error::Io {
			path: requested.to_owned(),
			source,
		};

		let inside = match tokio::fs::metadata(&path).await {
			Ok(metadata) if metadata.is_file() => self.root.contains(&path).await,
			Ok(_) => Ok(false),
			Err(error) => Err(error),
		};

		match inside {
			Ok(true) => {}
			Ok(false) => return Err(not_found()),
			Err(error) if error.kind() == io::ErrorKind::NotFound => return Err(not_found()),
			Err(source) => return Err(io_error(source)),
		}

		tokio::fs::read(&path).await.map_err(|error| {
			if error.kind() == io::ErrorKind::NotFound {
				not_found()
			} else {
				io_error(error)
			}
		})
	}
}

#[cfg(test)]
mod test {
	use crate::token::Secret;

	use super::*;

	fn setup() -> (tempfile::TempDir, TokenService, Gateway) {
		let dir = tempfile::tempdir().unwrap();
		let root = ImageRoot::new(dir.path());
		let tokens = TokenService::new(Secret::generate());

		std::fs::create_dir_all(root.directory()).unwrap();
		std::fs::write(root.directory().join("photo.jpg"), b"jpeg bytes").unwrap();

		let gateway = Gateway::new(tokens.clone(), root);

		(dir, tokens, gateway)
	}

	#[tokio::test]
	async fn test_fetch_releases_bytes() {
		let (_dir, tokens, gateway) = setup();
		let token = tokens.issue("images/photo.jpg");

		assert_eq!(
			gateway.fetch(token.as_str(), "images/photo.jpg").await.unwrap(),
			b"jpeg bytes"
		);
	}

	#[tokio::test]
	async fn test_fetch_checks_the_token_first() {
		let (_dir, tokens, gateway) = setup();
		let token = tokens.issue("images/other.jpg");

		assert!(matches!(
			gateway.fetch(token.as_str(), "images/photo.jpg").await,
			Err(Error::Forbidden(Unauthorized::PathMismatch))
		));
		assert!(matches!(
			gateway.fetch("garbage", "images/missing.jpg").await,
			Err(Error::Forbidden(Unauthorized::Tampered))
		));
	}

	#[tokio::test]
	async fn test_fetch_missing_file() {
		let (_dir, tokens, gateway) = setup();
		let token = tokens.issue("images/missing.jpg");

		assert!(matches!(
			gateway.fetch(token.as_str(), "images/missing.jpg").await,
			Err(Error::NotFound(..))
		));
	}

	#[tokio::test]
	async fn test_fetch_never_leaves_the_image_directory() {
		let (dir, tokens, gateway) = setup();

		std::fs::write(dir.path().join("blogs.json"), b"[]").unwrap();

		for path in ["images/../blogs.json", "blogs.json", "images"] {
			let token = tokens.issue(path);

			assert!(
				matches!(gateway.fetch(token.as_str(), path).await, Err(Error::NotFound(..))),
				"{path} should not be readable"
			);
		}
	}
}
