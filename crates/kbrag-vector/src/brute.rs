use anyhow::Result;

use kbrag_core::types::{SearchHit, SourceKind};

/// Exact cosine search by linear scan. Rows are normalized once at build time.
pub struct BruteForceIndex { ids: Vec<String>, rows: Vec<Vec<f32>>, dim: usize }

impl BruteForceIndex {
	pub fn build(ids: Vec<String>, vectors: Vec<Vec<f32>>, dim: usize) -> Result<Self> {
		let rows = vectors.into_iter().map(unit).collect();
		Ok(Self { ids, rows, dim })
	}

	pub fn len(&self) -> usize { self.ids.len() }

	pub fn is_empty(&self) -> bool { self.ids.is_empty() }

	pub fn dim(&self) -> usize { self.dim }

	pub fn nearest(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
		let q = unit(query.to_vec());
		let mut scored: Vec<(usize, f32)> = self.rows.iter().enumerate()
			.map(|(pos, row)| (pos, row.iter().zip(&q).map(|(a, b)| a * b).sum::<f32>()))
			.map(|(pos, s)| (pos, if s.is_finite() { s } else { 0.0 }))
			.collect();
		// stable sort keeps build order among equal scores
		scored.sort_by(|a, b| b.1.total_cmp(&a.1));
		scored.into_iter().take(k).map(|(pos, score)| SearchHit { id: self.ids[pos].clone(), score, source: SourceKind::Vector }).collect()
	}
}

fn unit(mut v: Vec<f32>) -> Vec<f32> {
	let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
	if norm > 0.0 { for x in &mut v { *x /= norm; } }
	v
}
