use std::ops::Range;
use std::path::PathBuf;

use anyhow::anyhow;

/// Per-slot candidate state. Mutated only through `CandidateSelector`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    pub index: usize,
    pub range: Range<u64>,
    /// Score of the persisted candidate.
    pub best_score: Option<u32>,
    /// Frame index of the persisted candidate.
    pub best_frame: Option<u64>,
    pub artifact: Option<PathBuf>,
    pub finalized: bool,
}

impl Slot {
    fn new(index: usize, range: Range<u64>) -> Self {
        Self {
            index,
            range,
            best_score: None,
            best_frame: None,
            artifact: None,
            finalized: false,
        }
    }
}

/// Outcome of offering a scored frame to a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// First candidate of the slot, persisted whatever its score.
    Baseline,
    /// Strictly better than the held candidate; persisted over it.
    Improved { previous: u32 },
    /// Not better; nothing written.
    Keep { best: u32 },
}

impl Decision {
    pub fn persists(&self) -> bool {
        !matches!(self, Decision::Keep { .. })
    }
}

/// Tracks the best-scoring frame of every visited slot.
///
/// Slots are created when the scan first enters their range. Ties keep the
/// earlier frame.
#[derive(Debug, Default)]
pub struct CandidateSelector {
    slots: Vec<Slot>,
}

impl CandidateSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_slot(&mut self, index: usize, range: Range<u64>) -> anyhow::Result<()> {
        if self.slot(index).is_some() {
            return Err(anyhow!("slot {} was already entered", index));
        }
        self.slots.push(Slot::new(index, range));
        Ok(())
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.iter().find(|s| s.index == index)
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// What offering `score` to `slot` would do. Pure.
    pub fn decide(&self, slot: usize, score: u32) -> Decision {
        match self.slot(slot).and_then(|s| s.best_score) {
            None => Decision::Baseline,
            Some(best) if score > best => Decision::Improved { previous: best },
            Some(best) => Decision::Keep { best },
        }
    }

    /// Offer a scored frame. When the decision persists, `persist` runs and must
    /// return the artifact path; if it fails the slot keeps its prior candidate.
    pub fn offer<E, F>(
        &mut self,
        slot: usize,
        frame_index: u64,
        score: u32,
        persist: F,
    ) -> Result<Decision, E>
    where
        E: From<anyhow::Error>,
        F: FnOnce() -> Result<PathBuf, E>,
    {
        let decision = self.decide(slot, score);
        let entry = self
            .slots
            .iter_mut()
            .find(|s| s.index == slot)
            .ok_or_else(|| anyhow!("slot {} has not been entered", slot))?;
        if entry.finalized {
            return Err(anyhow!("slot {} is finalized", slot).into());
        }
        if !entry.range.contains(&frame_index) {
            return Err(anyhow!(
                "frame {} is outside slot {} ({:?})",
                frame_index,
                slot,
                entry.range
            )
            .into());
        }
        if !decision.persists() {
            return Ok(decision);
        }

        let artifact = persist()?;
        entry.best_score = Some(score);
        entry.best_frame = Some(frame_index);
        entry.artifact = Some(artifact);
        Ok(decision)
    }

    /// Make `slot` read-only.
    pub fn finalize(&mut self, slot: usize) {
        if let Some(entry) = self.slots.iter_mut().find(|s| s.index == slot) {
            entry.finalized = true;
        }
    }

    pub fn finalize_all(&mut self) {
        for entry in &mut self.slots {
            entry.finalized = true;
        }
    }

    /// Artifact paths of every slot holding one, in slot order.
    pub fn artifacts(&self) -> Vec<PathBuf> {
        let mut slots: Vec<&Slot> = self.slots.iter().collect();
        slots.sort_by_key(|s| s.index);
        slots
            .into_iter()
            .filter_map(|s| s.artifact.clone())
            .collect()
    }

    pub fn into_slots(self) -> Vec<Slot> {
        self.slots
    }
}
