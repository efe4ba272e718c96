//! Saving and restoring a fitted classifier.
//!
//! The feature schema and model parameters are written together as one
//! CRC-checked frame, so a restored classifier can never be paired with a
//! schema it was not trained on. Files are written to a temporary path,
//! fsynced, then renamed over the target.

mod codec;

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::classifier::{EvaluationMetrics, FittedClassifier, ModelSnapshot, PopulationSummary};
use crate::error::PersistenceError;
use crate::features::FeatureSchema;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedClassifier {
    run_id: Uuid,
    trained_at: DateTime<Utc>,
    schema: FeatureSchema,
    model: ModelSnapshot,
    metrics: Option<EvaluationMetrics>,
    population: PopulationSummary,
}

/// Writes `fitted` to `path` atomically.
///
/// # Errors
///
/// - `PersistenceError::NotExportable` if the classifier has no serializable
///   parameters.
/// - `PersistenceError::Io` if the file cannot be written or renamed.
pub fn save(path: impl AsRef<Path>, fitted: &FittedClassifier) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    let model = fitted
        .model
        .snapshot()
        .ok_or_else(|| PersistenceError::NotExportable {
            name: fitted.model.name().to_string(),
        })?;
    let persisted = PersistedClassifier {
        run_id: fitted.run_id,
        trained_at: fitted.trained_at,
        schema: fitted.schema.clone(),
        model,
        metrics: fitted.metrics.clone(),
        population: fitted.population,
    };

    let temp_path = path.with_extension(format!("tmp.{}", Uuid::new_v4()));
    let result = write_file(&temp_path, &persisted).and_then(|()| {
        fs::rename(&temp_path, path)?;
        Ok(())
    });
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result?;

    info!(
        run_id = %fitted.run_id,
        path = %path.display(),
        columns = fitted.schema.len(),
        "Saved safety classifier"
    );
    Ok(())
}

fn write_file(path: &Path, persisted: &PersistedClassifier) -> Result<(), PersistenceError> {
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let mut writer = BufWriter::new(file);
    codec::write_header(&mut writer)?;
    codec::write_frame(&mut writer, persisted)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Reads a classifier written by [`save`].
///
/// # Errors
///
/// - `PersistenceError::Io` if the file cannot be read.
/// - `PersistenceError::UnsupportedVersion` for files from another format
///   version.
/// - `PersistenceError::Corrupted` on bad magic, CRC mismatch, malformed
///   payload, or model parameters that do not fit the schema.
/// - `PersistenceError::FingerprintMismatch` if the schema was altered.
pub fn load(path: impl AsRef<Path>) -> Result<FittedClassifier, PersistenceError> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    codec::read_header(&mut reader)?;
    let persisted: PersistedClassifier = codec::read_frame(&mut reader)?;

    let mut schema = persisted.schema;
    if let Some(computed) = schema.verify_fingerprint() {
        return Err(PersistenceError::FingerprintMismatch {
            stored: schema.fingerprint().to_string(),
            computed,
        });
    }
    schema.rebuild_index();

    persisted
        .model
        .check(schema.len())
        .map_err(|reason| PersistenceError::Corrupted { reason })?;

    info!(
        run_id = %persisted.run_id,
        path = %path.display(),
        columns = schema.len(),
        "Loaded safety classifier"
    );
    Ok(FittedClassifier {
        run_id: persisted.run_id,
        trained_at: persisted.trained_at,
        schema,
        model: persisted.model.into_classifier(),
        metrics: persisted.metrics,
        population: persisted.population,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::classifier::{Classifier, LogisticModel};
    use crate::error::InferenceFailure;
    use crate::features::FeatureVector;

    fn fitted(model: Arc<dyn Classifier>) -> FittedClassifier {
        let schema = FeatureSchema::from_parts(
            vec!["allergy:dairy".to_string(), "price".to_string()],
            vec!["malay".to_string()],
        );
        FittedClassifier {
            run_id: Uuid::new_v4(),
            trained_at: Utc::now(),
            schema,
            model,
            metrics: None,
            population: PopulationSummary::default(),
        }
    }

    #[test]
    fn roundtrip_preserves_schema_and_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifier.plsf");
        let model = LogisticModel::from_parameters(vec![2.0, -0.5], 0.1, vec![0.5, 20.0], vec![0.5, 5.0]);
        let original = fitted(Arc::new(model));
        save(&path, &original).unwrap();

        let restored = load(&path).unwrap();
        assert_eq!(restored.run_id, original.run_id);
        assert_eq!(restored.schema, original.schema);
        assert_eq!(restored.schema.position("price"), Some(1));
        let x = FeatureVector::from(vec![1.0, 25.0]);
        assert_eq!(
            restored.model.predict_unsafe(&x).unwrap(),
            original.model.predict_unsafe(&x).unwrap()
        );
    }

    #[derive(Debug)]
    struct Opaque;

    impl Classifier for Opaque {
        fn name(&self) -> &str {
            "opaque"
        }

        fn predict_unsafe(&self, _features: &FeatureVector) -> Result<f64, InferenceFailure> {
            Ok(0.5)
        }
    }

    #[test]
    fn opaque_classifier_is_not_exportable() {
        let dir = tempfile::tempdir().unwrap();
        let err = save(dir.path().join("c.plsf"), &fitted(Arc::new(Opaque))).unwrap_err();
        assert!(matches!(err, PersistenceError::NotExportable { name } if name == "opaque"));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.plsf");
        let model = LogisticModel::from_parameters(vec![1.0], 0.0, vec![0.0], vec![1.0]);
        save(&path, &fitted(Arc::new(model))).unwrap();
        assert!(matches!(
            load(&path).unwrap_err(),
            PersistenceError::Corrupted { .. }
        ));
    }

    fn stored_model(parameters: serde_json::Value) -> LogisticModel {
        serde_json::from_value(parameters).unwrap()
    }

    #[test]
    fn mismatched_standardisation_lengths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.plsf");
        let model = stored_model(serde_json::json!({
            "weights": [1.0, 2.0],
            "bias": 0.0,
            "means": [0.0],
            "scales": [1.0, 1.0],
        }));
        save(&path, &fitted(Arc::new(model))).unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupted { ref reason } if reason.contains("means")));
    }

    #[test]
    fn zero_scale_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.plsf");
        let model = stored_model(serde_json::json!({
            "weights": [1.0, 2.0],
            "bias": 0.0,
            "means": [0.0, 0.0],
            "scales": [1.0, 0.0],
        }));
        save(&path, &fitted(Arc::new(model))).unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupted { ref reason } if reason.contains("scale")));
    }
}
