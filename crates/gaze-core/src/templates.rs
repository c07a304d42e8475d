//! Enrollment templates: per-identity averaged embeddings.

use crate::capability::EmbeddingExtractor;
use crate::frame::Frame;
use crate::types::{BoundingBox, Embedding, Identity};
use chrono::Utc;
use thiserror::Error;

/// Minimum number of usable samples averaged into a template.
pub const MIN_ENROLLMENT_SAMPLES: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentError {
    #[error("not enough usable face samples: found {found}, need {required}")]
    InsufficientSamples { found: usize, required: usize },
    #[error("identity name must not be empty")]
    EmptyName,
}

/// In-memory set of enrolled identities, in enrollment order.
///
/// Order matters: the matcher resolves score ties in favour of the identity
/// that comes first.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    identities: Vec<Identity>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from previously persisted identities.
    pub fn from_identities(identities: Vec<Identity>) -> Self {
        let mut store = Self::new();
        for identity in identities {
            store.upsert(identity);
        }
        store
    }

    /// Enroll `name` from captured frames and their detected face boxes.
    ///
    /// Frames without a box are skipped, as are crops the extractor cannot
    /// embed. Replaces any existing identity with the same name.
    pub fn enroll(
        &mut self,
        name: &str,
        samples: &[(Frame, Option<BoundingBox>)],
        extractor: &mut dyn EmbeddingExtractor,
    ) -> Result<Identity, EnrollmentError> {
        if name.trim().is_empty() {
            return Err(EnrollmentError::EmptyName);
        }

        let embeddings = samples.iter().map(|(frame, face)| {
            face.as_ref()
                .and_then(|face| extractor.extract(frame, face))
        });
        self.enroll_embeddings(name, embeddings)
    }

    /// Enroll `name` from already-extracted per-frame embeddings.
    ///
    /// `None` entries are frames where detection or extraction produced
    /// nothing. Invalid vectors (zero norm, non-finite) and vectors whose
    /// dimensionality differs from the first usable sample are dropped.
    pub fn enroll_embeddings<I>(&mut self, name: &str, embeddings: I) -> Result<Identity, EnrollmentError>
    where
        I: IntoIterator<Item = Option<Embedding>>,
    {
        if name.trim().is_empty() {
            return Err(EnrollmentError::EmptyName);
        }

        let mut usable: Vec<Embedding> = Vec::new();
        let mut rejected = 0usize;
        for embedding in embeddings.into_iter().flatten() {
            let dim_ok = usable.first().map_or(true, |first| first.dim() == embedding.dim());
            if embedding.is_valid() && dim_ok {
                usable.push(embedding);
            } else {
                rejected += 1;
            }
        }

        if rejected > 0 {
            tracing::debug!(name, rejected, "discarded unusable enrollment embeddings");
        }

        let template = match Embedding::mean(&usable) {
            Some(t) if usable.len() >= MIN_ENROLLMENT_SAMPLES => t,
            _ => {
                tracing::info!(name, found = usable.len(), "enrollment rejected");
                return Err(EnrollmentError::InsufficientSamples {
                    found: usable.len(),
                    required: MIN_ENROLLMENT_SAMPLES,
                });
            }
        };

        let identity = Identity {
            name: name.to_string(),
            template,
            sample_count: usable.len(),
            enrolled_at: Utc::now(),
        };
        tracing::info!(name, samples = usable.len(), "enrolled identity");
        self.upsert(identity.clone());
        Ok(identity)
    }

    /// Remove an identity. Returns whether it existed.
    pub fn delete(&mut self, name: &str) -> bool {
        let before = self.identities.len();
        self.identities.retain(|i| i.name != name);
        self.identities.len() != before
    }

    /// Names of all enrolled identities, in enrollment order.
    pub fn all(&self) -> Vec<String> {
        self.identities.iter().map(|i| i.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.name == name)
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn clear(&mut self) {
        self.identities.clear();
    }

    /// Insert or replace in place, keeping the original position of a re-enrolled name.
    fn upsert(&mut self, identity: Identity) {
        match self.identities.iter_mut().find(|i| i.name == identity.name) {
            Some(slot) => *slot = identity,
            None => self.identities.push(identity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Extractor that hands out scripted embeddings in order.
    struct ScriptedExtractor {
        outputs: Vec<Option<Embedding>>,
        calls: usize,
    }

    impl ScriptedExtractor {
        fn new(outputs: Vec<Option<Embedding>>) -> Self {
            Self { outputs, calls: 0 }
        }
    }

    impl EmbeddingExtractor for ScriptedExtractor {
        fn extract(&mut self, _frame: &Frame, _face: &BoundingBox) -> Option<Embedding> {
            let out = self.outputs.get(self.calls).cloned().flatten();
            self.calls += 1;
            out
        }
    }

    fn face() -> Option<BoundingBox> {
        Some(BoundingBox { x: 0.0, y: 0.0, width: 8.0, height: 8.0 })
    }

    fn frame(seq: u32) -> Frame {
        Frame::new(vec![0; 64], 8, 8, seq)
    }

    fn emb(values: &[f32]) -> Option<Embedding> {
        Some(Embedding::new(values.to_vec()))
    }

    #[test]
    fn test_enroll_two_samples_is_insufficient() {
        let mut store = TemplateStore::new();
        let mut extractor = ScriptedExtractor::new(vec![emb(&[1.0, 0.0]), emb(&[0.0, 1.0])]);
        let samples = vec![(frame(0), face()), (frame(1), face())];

        let err = store.enroll("alice", &samples, &mut extractor).unwrap_err();
        assert_eq!(err, EnrollmentError::InsufficientSamples { found: 2, required: 3 });
        assert!(store.is_empty());
    }

    #[test]
    fn test_enroll_three_samples_averages() {
        let mut store = TemplateStore::new();
        let mut extractor = ScriptedExtractor::new(vec![
            emb(&[1.0, 2.0, 3.0]),
            emb(&[3.0, 2.0, 1.0]),
            emb(&[2.0, 5.0, 2.0]),
        ]);
        let samples = vec![(frame(0), face()), (frame(1), face()), (frame(2), face())];

        let identity = store.enroll("alice", &samples, &mut extractor).unwrap();
        assert_eq!(identity.sample_count, 3);
        let expected = [2.0, 3.0, 2.0];
        for (got, want) in identity.template.values.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-6);
        }
        assert_eq!(store.all(), vec!["alice".to_string()]);
    }

    #[test]
    fn test_enroll_skips_frames_without_face() {
        let mut store = TemplateStore::new();
        let mut extractor = ScriptedExtractor::new(vec![
            emb(&[1.0, 0.0]),
            emb(&[1.0, 0.0]),
            emb(&[1.0, 0.0]),
        ]);
        let samples = vec![
            (frame(0), face()),
            (frame(1), None),
            (frame(2), face()),
            (frame(3), None),
        ];

        // Only two frames reach the extractor
        let err = store.enroll("alice", &samples, &mut extractor).unwrap_err();
        assert_eq!(err, EnrollmentError::InsufficientSamples { found: 2, required: 3 });
        assert_eq!(extractor.calls, 2);
    }

    #[test]
    fn test_enroll_discards_degenerate_embeddings() {
        let mut store = TemplateStore::new();
        let embeddings = vec![
            emb(&[1.0, 0.0]),
            emb(&[0.0, 0.0]),
            None,
            emb(&[1.0, 0.0, 0.0]),
            emb(&[0.0, 1.0]),
        ];
        let err = store.enroll_embeddings("alice", embeddings).unwrap_err();
        assert_eq!(err, EnrollmentError::InsufficientSamples { found: 2, required: 3 });
    }

    #[test]
    fn test_enroll_rejects_empty_name() {
        let mut store = TemplateStore::new();
        let err = store
            .enroll_embeddings("  ", vec![emb(&[1.0]), emb(&[1.0]), emb(&[1.0])])
            .unwrap_err();
        assert_eq!(err, EnrollmentError::EmptyName);
    }

    #[test]
    fn test_reenroll_replaces_in_place() {
        let mut store = TemplateStore::new();
        let three = |v: f32| vec![emb(&[v, 1.0]), emb(&[v, 1.0]), emb(&[v, 1.0])];

        store.enroll_embeddings("alice", three(1.0)).unwrap();
        store.enroll_embeddings("bob", three(2.0)).unwrap();
        store.enroll_embeddings("alice", three(5.0)).unwrap();

        assert_eq!(store.all(), vec!["alice".to_string(), "bob".to_string()]);
        let alice = store.get("alice").unwrap();
        assert!((alice.template.values[0] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_delete() {
        let mut store = TemplateStore::new();
        store
            .enroll_embeddings("alice", vec![emb(&[1.0]), emb(&[1.0]), emb(&[1.0])])
            .unwrap();

        assert!(store.delete("alice"));
        assert!(!store.delete("alice"));
        assert!(store.is_empty());
    }
}
