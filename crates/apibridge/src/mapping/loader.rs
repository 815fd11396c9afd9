// Filesystem store for mapping documents

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use super::types::MappingDocument;
use super::validation::validate_document;

#[derive(Debug, Error)]
pub enum LoadError {
	#[error("config file not found: {}", path.display())]
	NotFound { path: PathBuf },

	#[error("failed to read {file}: {source}")]
	Read {
		file: String,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid config in {file}: yaml syntax error: {source}")]
	Parse {
		file: String,
		#[source]
		source: serde_yaml::Error,
	},

	#[error("invalid config in {file}: {reason}")]
	Invalid { file: String, reason: String },

	#[error("failed to write {file}: {source}")]
	Write {
		file: String,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to serialize {file}: {source}")]
	Serialize {
		file: String,
		#[source]
		source: serde_yaml::Error,
	},
}

/// Reads and writes mapping documents in a single directory. A document's
/// id is its file stem; only `*.yaml` files are considered.
#[derive(Debug, Clone)]
pub struct DocumentStore {
	root: PathBuf,
}

impl DocumentStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn document_path(&self, id: &str) -> PathBuf {
		self.root.join(format!("{id}.yaml"))
	}

	pub async fn exists(&self, id: &str) -> bool {
		fs_err::tokio::metadata(self.document_path(id)).await.is_ok()
	}

	/// Load and validate one document by id.
	pub async fn load(&self, id: &str) -> Result<MappingDocument, LoadError> {
		let path = self.document_path(id);
		let file = format!("{id}.yaml");

		let content = match fs_err::tokio::read_to_string(&path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(LoadError::NotFound { path });
			},
			Err(e) => return Err(LoadError::Read { file, source: e }),
		};

		parse_document(&file, &content)
	}

	/// Load every `*.yaml` document in the directory, keyed by file stem.
	/// Fails on the first unreadable or invalid document.
	pub async fn load_all(&self) -> Result<BTreeMap<String, MappingDocument>, LoadError> {
		let mut dir = fs_err::tokio::read_dir(&self.root)
			.await
			.map_err(|e| LoadError::Read {
				file: self.root.display().to_string(),
				source: e,
			})?;

		let mut documents = BTreeMap::new();
		while let Some(entry) = dir.next_entry().await.map_err(|e| LoadError::Read {
			file: self.root.display().to_string(),
			source: e,
		})? {
			let path = entry.path();
			if path.extension().is_none_or(|ext| ext != "yaml") {
				continue;
			}
			let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
				continue;
			};
			documents.insert(id.to_string(), self.load(id).await?);
		}

		Ok(documents)
	}

	/// Serialize a document to its file.
	pub async fn write(&self, id: &str, document: &MappingDocument) -> Result<(), LoadError> {
		let file = format!("{id}.yaml");
		let content = serde_yaml::to_string(document).map_err(|e| LoadError::Serialize {
			file: file.clone(),
			source: e,
		})?;
		fs_err::tokio::write(self.document_path(id), content)
			.await
			.map_err(|e| LoadError::Write { file, source: e })
	}

	/// Remove a document's file. Missing files are not an error.
	pub async fn delete(&self, id: &str) -> Result<(), LoadError> {
		match fs_err::tokio::remove_file(self.document_path(id)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(LoadError::Write {
				file: format!("{id}.yaml"),
				source: e,
			}),
		}
	}
}

fn parse_document(file: &str, content: &str) -> Result<MappingDocument, LoadError> {
	let document: MappingDocument =
		serde_yaml::from_str(content).map_err(|e| LoadError::Parse {
			file: file.to_string(),
			source: e,
		})?;

	let result = validate_document(&document);
	for warning in &result.warnings {
		warn!(%file, %warning, "mapping document warning");
	}
	if !result.is_ok() {
		return Err(LoadError::Invalid {
			file: file.to_string(),
			reason: result.error_summary(),
		});
	}

	Ok(document)
}
