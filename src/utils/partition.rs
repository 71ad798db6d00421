//! Groups a barcode-sorted read-pair stream into one shard per bead.
//!
//! A shard closes as soon as the number of pairs promised by the index has
//! been collected, before the next pair is pulled from the stream. The index
//! is advisory: a bead that runs short is closed with what it has when the
//! next barcode starts, and pairs beyond the promised count are dropped.
//! A barcode that sorts before one already seen means the input is not
//! sorted and ends the run.

use std::sync::Arc;

use log::{debug, warn};

use crate::config::defs::{PipelineError, SHARD_ID_WIDTH, SHARD_PREFIX};
use crate::utils::fastx::{Barcode, ReadPair};
use crate::utils::index::{BarcodeIndex, BeadEntry};


/// All pairs collected for one bead, in stream order.
#[derive(Debug, Clone)]
pub struct Shard {
    pub entry: BeadEntry,
    pub pairs: Vec<ReadPair>,
}

impl Shard {
    /// `BI` plus the bead id zero-padded to eight characters.
    pub fn shard_id(&self) -> String {
        shard_id(&self.entry.bead_id)
    }

    pub fn barcode(&self) -> &Barcode {
        &self.entry.barcode
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// True when the shard holds exactly as many pairs as the index promised.
    pub fn is_complete(&self) -> bool {
        self.pairs.len() == self.entry.expected_reads
    }
}

pub fn shard_id(bead_id: &str) -> String {
    format!("{}{:0>width$}", SHARD_PREFIX, bead_id, width = SHARD_ID_WIDTH)
}


#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PartitionStats {
    pub pairs_read: u64,
    pub shards: u64,
    pub short_shards: u64,
    pub skipped_pairs: u64,
    pub surplus_pairs: u64,
}


pub struct Partitioner<I> {
    source: I,
    index: Arc<BarcodeIndex>,
    open: Option<Shard>,
    pending: Option<ReadPair>,
    last_key: Option<Barcode>,
    last_closed: Option<Barcode>,
    surplus_warned: bool,
    stats: PartitionStats,
}

impl<I> Partitioner<I>
where
    I: Iterator<Item = Result<ReadPair, PipelineError>>,
{
    pub fn new(source: I, index: Arc<BarcodeIndex>) -> Self {
        Partitioner {
            source,
            index,
            open: None,
            pending: None,
            last_key: None,
            last_closed: None,
            surplus_warned: false,
            stats: PartitionStats::default(),
        }
    }

    pub fn stats(&self) -> PartitionStats {
        self.stats
    }

    /// Pulls pairs until a shard closes.
    ///
    /// # Returns
    /// Ok(Some(shard)) for each bead in stream order, Ok(None) when the
    /// stream is exhausted, or an OrderingViolation if a barcode goes backwards.
    pub fn next_shard(&mut self) -> Result<Option<Shard>, PipelineError> {
        loop {
            let pair = match self.pending.take() {
                Some(pair) => pair,
                None => match self.pull()? {
                    Some(pair) => pair,
                    None => return Ok(self.close_at_end()),
                },
            };

            match self.open.take() {
                Some(mut shard) if shard.entry.barcode == pair.barcode => {
                    shard.pairs.push(pair);
                    if shard.is_complete() {
                        return Ok(Some(self.close(shard)));
                    }
                    self.open = Some(shard);
                }
                Some(shard) => {
                    // pull() guarantees the new barcode sorts after the open one
                    warn!(
                        "Bead {} ({}) has {} of {} expected read pairs; assembling what was found",
                        shard.entry.bead_id,
                        shard.entry.barcode,
                        shard.pair_count(),
                        shard.entry.expected_reads
                    );
                    self.stats.short_shards += 1;
                    self.pending = Some(pair);
                    return Ok(Some(self.close(shard)));
                }
                None => {
                    if self.last_closed.as_ref() == Some(&pair.barcode) {
                        if !self.surplus_warned {
                            warn!("Barcode {} has more read pairs than the index lists; dropping the extras", pair.barcode);
                            self.surplus_warned = true;
                        }
                        self.stats.surplus_pairs += 1;
                        continue;
                    }
                    let entry = match self.index.get(&pair.barcode) {
                        Some(entry) if entry.expected_reads > 0 => entry.clone(),
                        _ => {
                            debug!("Skipping read pair with unlisted barcode {}", pair.barcode);
                            self.stats.skipped_pairs += 1;
                            continue;
                        }
                    };
                    let shard = Shard { entry, pairs: vec![pair] };
                    if shard.is_complete() {
                        return Ok(Some(self.close(shard)));
                    }
                    self.open = Some(shard);
                }
            }
        }
    }

    /// Next pair from the source, enforcing non-decreasing barcodes.
    fn pull(&mut self) -> Result<Option<ReadPair>, PipelineError> {
        let pair = match self.source.next() {
            Some(res) => res?,
            None => return Ok(None),
        };
        if let Some(last) = &self.last_key {
            if pair.barcode < *last {
                return Err(PipelineError::OrderingViolation {
                    previous: last.to_string(),
                    current: pair.barcode.to_string(),
                });
            }
        }
        self.last_key = Some(pair.barcode.clone());
        self.stats.pairs_read += 1;
        Ok(Some(pair))
    }

    fn close(&mut self, shard: Shard) -> Shard {
        self.last_closed = Some(shard.entry.barcode.clone());
        self.surplus_warned = false;
        self.stats.shards += 1;
        shard
    }

    fn close_at_end(&mut self) -> Option<Shard> {
        let shard = self.open.take()?;
        warn!(
            "Input ended with bead {} ({}) at {} of {} expected read pairs; assembling what was found",
            shard.entry.bead_id,
            shard.entry.barcode,
            shard.pair_count(),
            shard.entry.expected_reads
        );
        self.stats.short_shards += 1;
        Some(self.close(shard))
    }
}

impl<I> Iterator for Partitioner<I>
where
    I: Iterator<Item = Result<ReadPair, PipelineError>>,
{
    type Item = Result<Shard, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_shard().transpose()
    }
}
