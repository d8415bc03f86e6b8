use anyhow::{anyhow, Result};
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, DistanceType, Table};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

use kbrag_core::types::{SearchHit, SourceKind};

use crate::schema::build_arrow_schema;

const TABLE_NAME: &str = "chunks";

/// LanceDB table living in a private temporary directory for the lifetime of
/// the index. Searched with cosine distance; `score = 1 - distance`.
pub struct LanceIndex { _dir: TempDir, table: Table, positions: HashMap<String, usize>, len: usize, dim: usize }

impl LanceIndex {
	pub async fn build(ids: Vec<String>, vectors: Vec<Vec<f32>>, dim: usize) -> Result<Self> {
		let dir = TempDir::new()?;
		let db = connect(dir.path().to_string_lossy().as_ref()).execute().await?;
		let width = i32::try_from(dim).map_err(|_| anyhow!("embedding dim {dim} too large"))?;
		let schema = build_arrow_schema(width);
		let len = ids.len();
		let positions = ids.iter().enumerate().map(|(pos, id)| (id.clone(), pos)).collect();
		let rows: Vec<Option<Vec<Option<f32>>>> = vectors.into_iter().map(|v| Some(v.into_iter().map(Some).collect())).collect();
		let batch = RecordBatch::try_new(schema.clone(), vec![
			Arc::new(StringArray::from(ids)),
			Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(rows, width)),
		])?;
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
		let table = db.create_table(TABLE_NAME, reader).execute().await?;
		tracing::debug!(rows = len, dir = %dir.path().display(), "lance table created");
		Ok(Self { _dir: dir, table, positions, len, dim })
	}

	pub fn len(&self) -> usize { self.len }

	pub fn dim(&self) -> usize { self.dim }

	pub async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
		if k == 0 || self.len == 0 { return Ok(Vec::new()); }
		let mut stream = self.table.vector_search(query.to_vec())?.distance_type(DistanceType::Cosine).limit(k).execute().await?;
		let mut scored: Vec<(usize, String, f32)> = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			let ids = batch.column_by_name("id").and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("id column missing"))?;
			let dist = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>()).ok_or_else(|| anyhow!("_distance column missing"))?;
			for i in 0..batch.num_rows() {
				let id = ids.value(i).to_string();
				let score = if dist.is_null(i) { 0.0 } else { 1.0 - dist.value(i) };
				let score = if score.is_finite() { score } else { 0.0 };
				let pos = self.positions.get(&id).copied().unwrap_or(usize::MAX);
				scored.push((pos, id, score));
			}
		}
		// same ordering contract as the brute-force scan: score desc, then build order
		scored.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.0.cmp(&b.0)));
		Ok(scored.into_iter().take(k).map(|(_, id, score)| SearchHit { id, score, source: SourceKind::Vector }).collect())
	}
}
