//! Durable storage for a [`VectorIndex`].
//!
//! Layout under the index location:
//! - `manifest.json` names the live generation (see [`crate::manifest`])
//! - `gen-NNNNNN/` is a LanceDB database with one `chunks` table per generation
//!
//! `save` writes a fresh generation, swaps the manifest, then prunes all but
//! the live generation and the one before it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::ArrowError;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::connect;
use lancedb::query::{ExecutableQuery, QueryBase};
use tracing::{debug, info, warn};

use documind_core::{Error, Result};

use crate::index::{IndexSpec, VectorIndex};
use crate::lock::{lock_key, lock_location, WriteGuard};
use crate::manifest::{generation_dir_name, parse_generation_dir, Manifest, FORMAT_VERSION};
use crate::schema::{build_arrow_schema, TABLE_NAME};

const BATCH_SIZE: usize = 1000;

fn storage<E: std::fmt::Display>(e: E) -> Error {
	Error::Storage(e.to_string())
}

pub struct IndexStore {
	location: PathBuf,
}

impl IndexStore {
	pub fn new(location: impl Into<PathBuf>) -> Self {
		Self { location: location.into() }
	}

	pub fn location(&self) -> &Path {
		&self.location
	}

	/// Take the write lock for this location. Hold it across a whole ingestion.
	pub async fn lock(&self) -> Result<WriteGuard> {
		lock_location(&self.location).await
	}

	/// The manifest of the live index, if any.
	pub fn manifest(&self) -> Result<Manifest> {
		Manifest::read(&self.location)
	}

	/// Persist `index` as the new live generation, fully replacing the old one.
	pub async fn save(&self, index: &mut VectorIndex, guard: &WriteGuard) -> Result<u64> {
		if guard.location() != lock_key(&self.location)? {
			return Err(Error::Storage(format!(
				"write guard for {} does not cover {}",
				guard.location().display(),
				self.location.display()
			)));
		}
		tokio::fs::create_dir_all(&self.location).await?;

		let previous = match Manifest::read(&self.location) {
			Ok(m) => Some(m.generation),
			Err(Error::IndexNotFound(_)) => None,
			Err(e) => {
				warn!(error = %e, "replacing unreadable index");
				None
			}
		};
		let newest_on_disk = self.generations_on_disk().await?.into_iter().max();
		let generation = previous.max(newest_on_disk).unwrap_or(0) + 1;
		let data_dir = generation_dir_name(generation);
		let data_path = self.location.join(&data_dir);
		if data_path.exists() {
			tokio::fs::remove_dir_all(&data_path).await?;
		}

		write_table(&data_path, index).await?;

		let spec = index.spec();
		let manifest = Manifest {
			format_version: FORMAT_VERSION,
			generation,
			model_id: spec.model_id.clone(),
			dim: spec.dim,
			normalized: spec.normalized,
			count: index.len(),
			created_at: Utc::now(),
			data_dir,
		};
		manifest.write_atomic(&self.location)?;
		index.set_generation(generation);
		info!(generation, entries = index.len(), location = %self.location.display(), "index saved");

		self.prune(generation).await;
		Ok(generation)
	}

	/// Load the live index, checking it was built with `expected`.
	pub async fn load(&self, expected: &IndexSpec) -> Result<VectorIndex> {
		let mut manifest = Manifest::read(&self.location)?;
		if !self.location.join(&manifest.data_dir).exists() {
			// A concurrent save may have pruned it after we read the manifest.
			manifest = Manifest::read(&self.location)?;
		}
		manifest.check_compatible(expected, &self.location)?;
		let mut index = read_table(&self.location, &manifest).await?;
		index.set_generation(manifest.generation);
		debug!(generation = manifest.generation, entries = index.len(), "index loaded");
		Ok(index)
	}

	async fn generations_on_disk(&self) -> Result<Vec<u64>> {
		let mut out = Vec::new();
		let mut dir = match tokio::fs::read_dir(&self.location).await {
			Ok(d) => d,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
			Err(e) => return Err(e.into()),
		};
		while let Some(entry) = dir.next_entry().await? {
			if let Some(g) = entry.file_name().to_str().and_then(parse_generation_dir) {
				out.push(g);
			}
		}
		Ok(out)
	}

	async fn prune(&self, live: u64) {
		let generations = match self.generations_on_disk().await {
			Ok(g) => g,
			Err(e) => { warn!(error = %e, "could not list old generations"); return; }
		};
		for g in generations {
			if g == live || g + 1 == live {
				continue;
			}
			let path = self.location.join(generation_dir_name(g));
			if let Err(e) = tokio::fs::remove_dir_all(&path).await {
				warn!(path = %path.display(), error = %e, "could not prune old generation");
			}
		}
	}
}

async fn write_table(data_path: &Path, index: &VectorIndex) -> Result<()> {
	let dim = i32::try_from(index.spec().dim).map_err(storage)?;
	let schema = build_arrow_schema(dim);
	let entries: Vec<(&str, &[f32])> = index.entries().collect();
	let mut batches: Vec<std::result::Result<RecordBatch, ArrowError>> = Vec::new();
	for (batch_no, rows) in entries.chunks(BATCH_SIZE).enumerate() {
		batches.push(Ok(entries_to_record_batch(batch_no * BATCH_SIZE, rows, dim)?));
	}
	let db = connect(data_path.to_string_lossy().as_ref()).execute().await.map_err(storage)?;
	let reader = Box::new(RecordBatchIterator::new(batches.into_iter(), schema));
	db.create_table(TABLE_NAME, reader).execute().await.map_err(storage)?;
	Ok(())
}

fn entries_to_record_batch(offset: usize, rows: &[(&str, &[f32])], dim: i32) -> Result<RecordBatch> {
	let mut positions = Vec::with_capacity(rows.len());
	let mut contents = Vec::with_capacity(rows.len());
	let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(rows.len());
	for (i, (text, vector)) in rows.iter().enumerate() {
		positions.push(i32::try_from(offset + i).map_err(storage)?);
		contents.push(*text);
		vectors.push(Some(vector.iter().map(|&x| Some(x)).collect()));
	}
	let record_batch = RecordBatch::try_new(build_arrow_schema(dim), vec![
		Arc::new(Int32Array::from(positions)),
		Arc::new(StringArray::from(contents)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors.into_iter(), dim)),
	]).map_err(storage)?;
	Ok(record_batch)
}

async fn read_table(location: &Path, manifest: &Manifest) -> Result<VectorIndex> {
	let data_path = location.join(&manifest.data_dir);
	let corrupt = |reason: String| Error::corrupt(location, reason);
	if !data_path.exists() {
		return Err(corrupt(format!("generation directory {} is missing", manifest.data_dir)));
	}
	let db = connect(data_path.to_string_lossy().as_ref()).execute().await.map_err(|e| corrupt(e.to_string()))?;
	let names = db.table_names().execute().await.map_err(|e| corrupt(e.to_string()))?;
	if !names.iter().any(|n| n == TABLE_NAME) {
		return Err(corrupt(format!("table '{}' is missing", TABLE_NAME)));
	}
	let table = db.open_table(TABLE_NAME).execute().await.map_err(|e| corrupt(e.to_string()))?;

	let mut rows: Vec<(i32, String, Vec<f32>)> = Vec::with_capacity(manifest.count);
	if manifest.count > 0 {
		let mut stream = table.query().limit(manifest.count).execute().await.map_err(|e| corrupt(e.to_string()))?;
		while let Some(batch) = stream.try_next().await.map_err(|e| corrupt(e.to_string()))? {
			let positions = column::<Int32Array>(&batch, "position").ok_or_else(|| corrupt("position column missing".into()))?;
			let contents = column::<StringArray>(&batch, "content").ok_or_else(|| corrupt("content column missing".into()))?;
			let vectors = column::<FixedSizeListArray>(&batch, "vector").ok_or_else(|| corrupt("vector column missing".into()))?;
			if usize::try_from(vectors.value_length()).ok() != Some(manifest.dim) {
				return Err(corrupt(format!("stored vectors have dimension {}, manifest says {}", vectors.value_length(), manifest.dim)));
			}
			for i in 0..batch.num_rows() {
				if vectors.is_null(i) {
					return Err(corrupt(format!("row {} has no vector", positions.value(i))));
				}
				let values = vectors.value(i);
				let floats = values.as_primitive_opt::<Float32Type>().ok_or_else(|| corrupt("vector values are not f32".into()))?;
				rows.push((positions.value(i), contents.value(i).to_string(), floats.values().to_vec()));
			}
		}
	}
	if rows.len() != manifest.count {
		return Err(corrupt(format!("expected {} entries, found {}", manifest.count, rows.len())));
	}
	rows.sort_by_key(|r| r.0);
	if rows.iter().enumerate().any(|(i, r)| usize::try_from(r.0).ok() != Some(i)) {
		return Err(corrupt("entry positions are not contiguous".into()));
	}
	let (texts, vectors): (Vec<String>, Vec<Vec<f32>>) = rows.into_iter().map(|(_, t, v)| (t, v)).unzip();
	VectorIndex::build(manifest.spec(), texts, vectors).map_err(|e| corrupt(e.to_string()))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Option<&'a T> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<T>())
}
