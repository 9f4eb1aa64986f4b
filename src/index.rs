//! In-memory inverted-file (IVF) similarity index.
//!
//! Vectors are assigned to `nlist` centroid partitions at build time; a
//! search ranks centroids by distance to the query and exhaustively scans
//! the `nprobe` nearest partitions. Distances are squared Euclidean, so
//! results come back in ascending order with `0.0` meaning identical.
//! Equal distances tie-break arbitrarily.

use std::cmp::Ordering;

/// Lloyd refinement passes run when building the partition centroids.
const KMEANS_ITERATIONS: usize = 8;

/// Squared Euclidean (L2²) distance between two vectors of equal length.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// An inverted-file flat index over a single collection's vectors.
///
/// Keys are the collection's primary-key strings; the index itself holds
/// no record data. Built once per [`load`](crate::store::VectorStore::load)
/// and kept fresh by [`add`](IvfIndex::add) on insert.
pub struct IvfIndex {
    dim: usize,
    centroids: Vec<Vec<f32>>,
    partitions: Vec<Vec<usize>>,
    keys: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl IvfIndex {
    /// Build an index over `entries`, partitioned into at most `nlist`
    /// clusters. Centroid seeding is deterministic (evenly strided picks
    /// over insertion order) followed by a fixed number of Lloyd passes.
    pub fn build(dim: usize, entries: Vec<(String, Vec<f32>)>, nlist: usize) -> Self {
        let mut index = Self {
            dim,
            centroids: Vec::new(),
            partitions: Vec::new(),
            keys: Vec::with_capacity(entries.len()),
            vectors: Vec::with_capacity(entries.len()),
        };
        for (key, vector) in entries {
            index.keys.push(key);
            index.vectors.push(vector);
        }
        index.train(nlist);
        index
    }

    fn train(&mut self, nlist: usize) {
        let n = self.vectors.len();
        if n == 0 {
            self.centroids.clear();
            self.partitions.clear();
            return;
        }

        let k = nlist.min(n).max(1);
        self.centroids = (0..k).map(|i| self.vectors[i * n / k].clone()).collect();

        let mut assignment = vec![0usize; n];
        for _ in 0..KMEANS_ITERATIONS {
            for (i, v) in self.vectors.iter().enumerate() {
                assignment[i] = nearest_centroid(&self.centroids, v);
            }

            // Recompute means; an emptied partition keeps its old centroid.
            let mut sums = vec![vec![0.0f32; self.dim]; k];
            let mut counts = vec![0usize; k];
            for (i, v) in self.vectors.iter().enumerate() {
                let c = assignment[i];
                counts[c] += 1;
                for (s, x) in sums[c].iter_mut().zip(v.iter()) {
                    *s += x;
                }
            }
            for c in 0..k {
                if counts[c] > 0 {
                    for s in sums[c].iter_mut() {
                        *s /= counts[c] as f32;
                    }
                    self.centroids[c] = std::mem::take(&mut sums[c]);
                }
            }
        }

        self.partitions = vec![Vec::new(); k];
        for (i, v) in self.vectors.iter().enumerate() {
            self.partitions[nearest_centroid(&self.centroids, v)].push(i);
        }
    }

    /// Append one vector, assigning it to the nearest existing partition so
    /// it is immediately searchable.
    pub fn add(&mut self, key: String, vector: Vec<f32>) {
        if self.centroids.is_empty() {
            self.centroids.push(vector.clone());
            self.partitions.push(Vec::new());
        }
        let c = nearest_centroid(&self.centroids, &vector);
        self.partitions[c].push(self.vectors.len());
        self.keys.push(key);
        self.vectors.push(vector);
    }

    /// Up to `k` nearest entries in ascending distance, scanning the
    /// `nprobe` partitions closest to the query.
    pub fn search(&self, query: &[f32], k: usize, nprobe: usize) -> Vec<(String, f32)> {
        if self.vectors.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut ranked: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(c, centroid)| (c, squared_l2(centroid, query)))
            .collect();
        ranked.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        let mut hits: Vec<(usize, f32)> = Vec::new();
        for &(c, _) in ranked.iter().take(nprobe.max(1)) {
            for &i in &self.partitions[c] {
                hits.push((i, squared_l2(&self.vectors[i], query)));
            }
        }

        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        hits.truncate(k);
        hits.into_iter()
            .map(|(i, d)| (self.keys[i].clone(), d))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

fn nearest_centroid(centroids: &[Vec<f32>], v: &[f32]) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_l2(c, v)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
