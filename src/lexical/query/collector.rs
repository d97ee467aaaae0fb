//! Hit collectors.

use crate::lexical::snapshot::{DocAddress, ScoredDoc, TopDocs};

/// Receives every hit of a query in index order.
pub trait Collector {
    fn collect(&mut self, address: DocAddress, score: f32);
}

/// Keeps the `limit` best hits by descending score.
///
/// Ties are broken by index order so results are stable.
#[derive(Debug)]
pub struct TopDocsCollector {
    limit: usize,
    total_hits: usize,
    hits: Vec<ScoredDoc>,
}

impl TopDocsCollector {
    pub fn new(limit: usize) -> Self {
        TopDocsCollector {
            limit,
            total_hits: 0,
            hits: Vec::new(),
        }
    }

    pub fn into_top_docs(mut self) -> TopDocs {
        self.hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.address.cmp(&b.address))
        });
        self.hits.truncate(self.limit);
        TopDocs {
            total_hits: self.total_hits,
            hits: self.hits,
        }
    }
}

impl Collector for TopDocsCollector {
    fn collect(&mut self, address: DocAddress, score: f32) {
        self.total_hits += 1;
        if self.limit > 0 {
            self.hits.push(ScoredDoc { address, score });
        }
    }
}

/// Counts hits.
#[derive(Debug, Default)]
pub struct CountCollector {
    count: usize,
}

impl CountCollector {
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Collector for CountCollector {
    fn collect(&mut self, _address: DocAddress, _score: f32) {
        self.count += 1;
    }
}

/// Keeps every hit with a positive score, in index order, and tracks the
/// highest score seen.
#[derive(Debug, Default)]
pub struct MaxScoreCollector {
    hits: Vec<ScoredDoc>,
    max_score: f32,
}

impl MaxScoreCollector {
    pub fn max_score(&self) -> f32 {
        self.max_score
    }

    /// The hits, with scores divided by the maximum when it exceeds 1.
    pub fn into_normalized(mut self) -> Vec<ScoredDoc> {
        if self.max_score > 1.0 {
            for hit in &mut self.hits {
                hit.score /= self.max_score;
            }
        }
        self.hits
    }
}

impl Collector for MaxScoreCollector {
    fn collect(&mut self, address: DocAddress, score: f32) {
        if score > 0.0 {
            self.hits.push(ScoredDoc { address, score });
            if score > self.max_score {
                self.max_score = score;
            }
        }
    }
}
