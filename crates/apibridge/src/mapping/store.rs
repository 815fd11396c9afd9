// Registry store for hot-reloadable mapping documents

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::DebouncedEvent;
use tracing::{error, info};

use crate::mapping::loader::{DocumentStore, LoadError};
use crate::mapping::types::MappingDocument;
use crate::server::binding::RouteBinding;

/// Outcome of routing a request against the serving snapshot.
#[derive(Debug)]
pub enum RouteMatch {
	Found {
		document: Arc<MappingDocument>,
		params: HashMap<String, String>,
	},
	/// The path belongs to a known endpoint, but with a different method.
	MethodMismatch,
	NotFound,
}

struct BoundRoute {
	binding: RouteBinding,
	document: Arc<MappingDocument>,
}

/// Immutable view of the loaded documents plus their compiled routes.
/// Swapped wholesale on every reload or admin edit.
#[derive(Default)]
pub struct RegistrySnapshot {
	pub documents: BTreeMap<String, Arc<MappingDocument>>,
	routes: Vec<BoundRoute>,
}

impl RegistrySnapshot {
	pub fn compile(documents: BTreeMap<String, MappingDocument>) -> Self {
		let documents: BTreeMap<String, Arc<MappingDocument>> = documents
			.into_iter()
			.map(|(id, doc)| (id, Arc::new(doc)))
			.collect();
		let routes = documents
			.values()
			.map(|document| BoundRoute {
				binding: RouteBinding::new(&document.endpoint.v2_method, &document.endpoint.v2_path),
				document: Arc::clone(document),
			})
			.collect();
		Self { documents, routes }
	}

	/// First matching route wins; documents are bound in id order.
	pub fn resolve(&self, method: &str, path: &str) -> RouteMatch {
		let mut path_matched = false;
		for route in &self.routes {
			let Some(params) = route.binding.match_path(path) else {
				continue;
			};
			if route.binding.method() == method {
				return RouteMatch::Found {
					document: Arc::clone(&route.document),
					params,
				};
			}
			path_matched = true;
		}
		if path_matched {
			RouteMatch::MethodMismatch
		} else {
			RouteMatch::NotFound
		}
	}
}

/// Shared handle on the serving snapshot. Readers grab the current
/// `Arc` lock-free; the watcher and the admin API replace it.
#[derive(Clone)]
pub struct RegistryStore {
	loader: DocumentStore,
	current: Arc<ArcSwap<Option<Arc<RegistrySnapshot>>>>,
}

impl RegistryStore {
	pub fn new(loader: DocumentStore) -> Self {
		Self {
			loader,
			current: Arc::new(ArcSwap::new(Arc::new(None))),
		}
	}

	pub fn loader(&self) -> &DocumentStore {
		&self.loader
	}

	pub fn get_arc(&self) -> Option<Arc<RegistrySnapshot>> {
		let guard = self.current.load();
		guard.as_ref().as_ref().map(Arc::clone)
	}

	pub fn loaded_count(&self) -> usize {
		self.get_arc().map_or(0, |snapshot| snapshot.documents.len())
	}

	/// Populate the snapshot at startup. A missing or unreadable config
	/// directory is not fatal; the server starts with no endpoints and
	/// picks up documents as they appear.
	pub async fn initial_load(&self) {
		match self.reload().await {
			Ok(count) => info!(count, "loaded mapping documents"),
			Err(e) => {
				info!(error = %e, "no existing configurations found, starting fresh");
				self.current
					.store(Arc::new(Some(Arc::new(RegistrySnapshot::default()))));
			},
		}
	}

	/// Re-read every document from disk and swap in a fresh snapshot.
	/// On failure the previous snapshot keeps serving.
	pub async fn reload(&self) -> Result<usize, LoadError> {
		let documents = self.loader.load_all().await?;
		let count = documents.len();
		self.current
			.store(Arc::new(Some(Arc::new(RegistrySnapshot::compile(documents)))));
		Ok(count)
	}

	/// Insert or replace a single document in the serving snapshot.
	pub fn upsert(&self, id: &str, document: MappingDocument) {
		let mut documents = self.documents_owned();
		documents.insert(id.to_string(), document);
		self.current
			.store(Arc::new(Some(Arc::new(RegistrySnapshot::compile(documents)))));
	}

	/// Drop a single document from the serving snapshot.
	pub fn remove(&self, id: &str) {
		let mut documents = self.documents_owned();
		documents.remove(id);
		self.current
			.store(Arc::new(Some(Arc::new(RegistrySnapshot::compile(documents)))));
	}

	fn documents_owned(&self) -> BTreeMap<String, MappingDocument> {
		match self.get_arc() {
			Some(snapshot) => snapshot
				.documents
				.iter()
				.map(|(id, doc)| (id.clone(), (**doc).clone()))
				.collect(),
			None => BTreeMap::new(),
		}
	}

	/// Spawn a background task that watches the config directory and
	/// reloads on changes.
	pub fn spawn_watcher(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
		tokio::spawn(async move {
			if let Err(e) = self.watch_directory().await {
				error!(error = %e, "config watcher stopped");
			}
		})
	}

	async fn watch_directory(&self) -> Result<(), notify::Error> {
		let (tx, mut rx) = tokio::sync::mpsc::channel(1);

		// 250ms debounce absorbs editor write bursts
		let mut watcher = notify_debouncer_full::new_debouncer(
			Duration::from_millis(250),
			None,
			move |res| {
				futures::executor::block_on(async {
					let _ = tx.send(res).await;
				})
			},
		)?;

		watcher.watch(self.loader.root(), RecursiveMode::NonRecursive)?;
		info!(dir = %self.loader.root().display(), "watching mapping documents");

		while let Some(Ok(events)) = rx.recv().await {
			if !events.iter().any(is_document_event) {
				continue;
			}
			info!("mapping documents changed, reloading");
			match self.reload().await {
				Ok(count) => info!(count, "reloaded mapping documents"),
				Err(e) => error!(error = %e, "reload failed, serving previous documents"),
			}
		}

		drop(watcher);
		Ok(())
	}
}

fn is_document_event(event: &DebouncedEvent) -> bool {
	matches!(
		event.kind,
		EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
	) && event
		.paths
		.iter()
		.any(|path| path.extension().is_some_and(|ext| ext == "yaml"))
}
