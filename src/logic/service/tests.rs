use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use ndarray::Array2;

use super::*;
use crate::config::TrainingConfig;
use crate::logic::artifact::save_bundle;
use crate::logic::dataset::RelayInfo;
use crate::logic::features::{AggregateTable, EncoderRegistry, FeatureVector};
use crate::logic::model::TrainingSet;
use crate::logic::training::train_softmax;

/// Emits the same probability row for every input
struct FixedModel {
    row: Vec<f64>,
    width: usize,
}

impl FixedModel {
    fn new(row: Vec<f64>) -> Self {
        Self { row, width: FEATURE_COUNT }
    }
}

impl RankingModel for FixedModel {
    fn fit(&mut self, _training: &TrainingSet) -> Result<(), ModelError> {
        Ok(())
    }

    fn predict_proba(&self, features: &[FeatureVector]) -> Result<Array2<f64>, ModelError> {
        Ok(Array2::from_shape_fn((features.len(), self.row.len()), |(_, j)| self.row[j]))
    }

    fn feature_importance(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("exit_bandwidth".to_string(), 4.0),
            ("circuit_setup_duration".to_string(), 2.0),
            ("total_bytes".to_string(), 0.0),
        ])
    }

    fn num_classes(&self) -> usize {
        self.row.len()
    }

    fn input_width(&self) -> usize {
        self.width
    }

    fn model_type(&self) -> &'static str {
        "fixed"
    }
}

fn guard_fp(i: usize) -> String {
    format!("{:040X}", i + 1)
}

fn observations(guards: usize) -> Vec<CircuitObservation> {
    (0..guards)
        .map(|i| CircuitObservation {
            circuit_id: None,
            guard: Some(RelayInfo::new(&guard_fp(i), "US", 5.0)),
            middle: RelayInfo::new("M1", "DE", 4.0),
            exit: RelayInfo::new("E1", "FR", 3.0),
            setup_duration: 1.0,
            total_bytes: 1e6,
            status: None,
            purpose: None,
            timestamp: None,
            build_time: None,
        })
        .collect()
}

fn bundle(model: FixedModel) -> ArtifactBundle<FixedModel> {
    let obs = observations(model.row.len());
    ArtifactBundle::new(model, EncoderRegistry::fit(&obs), AggregateTable::build(&obs))
}

fn ready(row: Vec<f64>) -> PredictionService<FixedModel> {
    let service = PredictionService::new(ServiceSettings::default());
    service.load(bundle(FixedModel::new(row)), RelayDirectory::default()).unwrap();
    service
}

fn request() -> PredictionRequest {
    PredictionRequest::new("E1", "FR", 3.0, 0.8)
}

#[test]
fn test_predict_before_load_is_rejected() {
    let service: PredictionService<FixedModel> = PredictionService::new(ServiceSettings::default());
    assert_eq!(service.state(), ServiceState::Uninitialized);
    assert!(matches!(
        service.predict(&request()),
        Err(ServiceError::NotReady { state: ServiceState::Uninitialized })
    ));
    assert!(service.model_info().is_err());
}

#[test]
fn test_failed_load_is_terminal() {
    let service = PredictionService::new(ServiceSettings::default());
    let mut model = FixedModel::new(vec![0.5, 0.5]);
    model.width = 5;

    let err = service.load(bundle(model), RelayDirectory::default()).unwrap_err();
    assert!(matches!(err, ServiceError::Artifact(ArtifactError::InputWidth { expected: 31, actual: 5 })));
    assert_eq!(service.state(), ServiceState::Failed);
    assert!(service.status().last_error.is_some());

    // No way back out of Failed
    let retry = service.load(bundle(FixedModel::new(vec![0.5, 0.5])), RelayDirectory::default());
    assert!(matches!(retry, Err(ServiceError::Failed { .. })));
    assert!(matches!(service.predict(&request()), Err(ServiceError::Failed { .. })));
    assert_eq!(service.state(), ServiceState::Failed);
}

#[test]
fn test_second_load_is_refused() {
    let service = ready(vec![0.5, 0.5]);
    let again = service.load(bundle(FixedModel::new(vec![0.5, 0.5])), RelayDirectory::default());
    assert!(matches!(again, Err(ServiceError::NotReady { state: ServiceState::Ready })));
    assert_eq!(service.state(), ServiceState::Ready);
}

#[test]
fn test_ranking_order_and_labels() {
    let service = ready(vec![0.1, 0.3, 0.3, 0.2, 0.1]);
    let mut req = request();
    req.k = Some(3);

    let result = service.predict(&req).unwrap();
    assert_eq!(result.k, 3);
    let classes: Vec<usize> = result.predictions.iter().map(|p| p.class_index).collect();
    // Equal probabilities keep the lower class index first
    assert_eq!(classes, vec![1, 2, 3]);

    let ranks: Vec<usize> = result.predictions.iter().map(|p| p.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);

    let first = &result.predictions[0];
    assert_eq!(first.fingerprint, guard_fp(1));
    assert_eq!(first.nickname, "GuardNode001");
    assert_eq!(first.country, "Unknown");
    assert_eq!(first.confidence, 0.3);
    assert!(result.model_version.starts_with("fixed-"));
}

#[test]
fn test_metadata_labels() {
    let csv = format!(
        "guard_fingerprint,guard_nickname,guard_address,guard_country\n{},relayone,198.51.100.7,NL\n",
        guard_fp(0)
    );
    let relays = RelayDirectory::from_reader(csv.as_bytes()).unwrap();
    let service = PredictionService::new(ServiceSettings::default());
    service.load(bundle(FixedModel::new(vec![0.7, 0.3])), relays).unwrap();

    let result = service.predict(&request()).unwrap();
    assert_eq!(result.predictions[0].nickname, "relayone");
    assert_eq!(result.predictions[0].address, "198.51.100.7");
    assert_eq!(result.predictions[1].nickname, "GuardNode001");
}

#[test]
fn test_k_larger_than_class_count() {
    let service = ready(vec![0.6, 0.4]);
    let mut req = request();
    req.k = Some(50);

    let result = service.predict(&req).unwrap();
    assert_eq!(result.k, 2);
    assert_eq!(result.predictions.len(), 2);
}

#[test]
fn test_default_k_applies() {
    let service = ready(vec![1.0 / 12.0; 12]);
    let result = service.predict(&request()).unwrap();
    assert_eq!(result.k, crate::constants::DEFAULT_TOP_K);
}

#[test]
fn test_invalid_requests() {
    let service = ready(vec![0.5, 0.5]);

    for k in [0, -3] {
        let mut req = request();
        req.k = Some(k);
        assert!(matches!(service.predict(&req), Err(ServiceError::InvalidK(RankingError::InvalidK(v))) if v == k));
    }

    let mut req = request();
    req.exit_fingerprint = "  ".to_string();
    assert!(matches!(service.predict(&req), Err(ServiceError::InvalidRequest(_))));

    let mut req = request();
    req.setup_time = f64::NAN;
    assert!(matches!(service.predict(&req), Err(ServiceError::InvalidRequest(_))));

    // Rejections do not count as inferences
    assert_eq!(service.status().inference_count, 0);
}

#[test]
fn test_bad_model_rows_are_errors() {
    let service = ready(vec![0.5, 0.6]);
    assert!(matches!(
        service.predict(&request()),
        Err(ServiceError::Model(ModelError::NonNormalizedRow { .. }))
    ));

    let service = ready(vec![1.2, -0.2]);
    assert!(matches!(
        service.predict(&request()),
        Err(ServiceError::Model(ModelError::NegativeProbability { row: 0, class: 1 }))
    ));
}

#[test]
fn test_explanation_on_request() {
    let service = ready(vec![0.5, 0.5]);
    assert!(service.predict(&request()).unwrap().explanation.is_none());

    let mut req = request();
    req.explain = true;
    let explanation = service.predict(&req).unwrap().explanation.unwrap();
    let names: Vec<&str> = explanation.contributions.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["exit_bandwidth", "circuit_setup_duration"]);
    assert_eq!(explanation.contributions[0].value, 3.0);
}

#[test]
fn test_explanation_uses_persisted_importance() {
    let service = PredictionService::new(ServiceSettings::default());
    let mut b = bundle(FixedModel::new(vec![0.5, 0.5]));
    b.feature_importance = Some(BTreeMap::from([("total_bytes".to_string(), 1.0)]));
    service.load(b, RelayDirectory::default()).unwrap();

    let mut req = request();
    req.explain = true;
    let explanation = service.predict(&req).unwrap().explanation.unwrap();
    let names: Vec<&str> = explanation.contributions.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["total_bytes"]);
}

#[test]
fn test_predict_observation_ignores_guard() {
    let service = ready(vec![0.25, 0.75]);
    let obs = &observations(2)[0];
    let result = service.predict_observation(obs, 1).unwrap();
    assert_eq!(result.predictions[0].class_index, 1);
    assert!(service.predict_observation(obs, 0).is_err());
}

#[test]
fn test_failed_reload_keeps_current_context() {
    let service = ready(vec![0.6, 0.4]);
    let before = service.status().artifact_id.unwrap();

    let mut broken = FixedModel::new(vec![0.6, 0.4]);
    broken.width = 3;
    assert!(service.reload(bundle(broken), RelayDirectory::default()).is_err());
    assert_eq!(service.state(), ServiceState::Ready);
    assert_eq!(service.status().artifact_id.unwrap(), before);
    assert_eq!(service.predict(&request()).unwrap().predictions[0].class_index, 0);

    service.reload(bundle(FixedModel::new(vec![0.1, 0.9])), RelayDirectory::default()).unwrap();
    assert_ne!(service.status().artifact_id.unwrap(), before);
    assert_eq!(service.predict(&request()).unwrap().predictions[0].class_index, 1);
}

#[test]
fn test_loading_state_rejects_requests() {
    let service = ready(vec![0.5, 0.5]);
    *service.slot.write() = Slot::Loading;

    assert_eq!(service.status().state, ServiceState::Loading);
    assert!(matches!(
        service.predict(&request()),
        Err(ServiceError::NotReady { state: ServiceState::Loading })
    ));
    assert!(matches!(
        service.model_info(),
        Err(ServiceError::NotReady { state: ServiceState::Loading })
    ));
    assert!(matches!(
        service.reload(bundle(FixedModel::new(vec![0.5, 0.5])), RelayDirectory::default()),
        Err(ServiceError::NotReady { state: ServiceState::Loading })
    ));
    assert_eq!(service.state(), ServiceState::Loading);
}

#[test]
fn test_reload_requires_ready() {
    let service: PredictionService<FixedModel> = PredictionService::new(ServiceSettings::default());
    let result = service.reload(bundle(FixedModel::new(vec![0.5, 0.5])), RelayDirectory::default());
    assert!(matches!(result, Err(ServiceError::NotReady { .. })));
    assert_eq!(service.state(), ServiceState::Uninitialized);
}

#[test]
fn test_concurrent_predictions_during_reload() {
    let service = Arc::new(ready(vec![0.6, 0.4]));

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                for _ in 0..50 {
                    let result = service.predict(&request()).unwrap();
                    assert_eq!(result.predictions.len(), 2);
                    let total: f64 = result.predictions.iter().map(|p| p.confidence).sum();
                    assert!((total - 1.0).abs() < 1e-9);
                }
            })
        })
        .collect();

    for i in 0..10 {
        let row = if i % 2 == 0 { vec![0.3, 0.7] } else { vec![0.6, 0.4] };
        service.reload(bundle(FixedModel::new(row)), RelayDirectory::default()).unwrap();
    }
    for worker in workers {
        worker.join().unwrap();
    }

    let status = service.status();
    assert_eq!(status.inference_count, 400);
    assert_eq!(status.state, ServiceState::Ready);
}

#[test]
fn test_status_and_model_info() {
    let service = ready(vec![0.5, 0.5]);
    service.predict(&request()).unwrap();

    let status = service.status();
    assert_eq!(status.num_classes, 2);
    assert_eq!(status.feature_count, FEATURE_COUNT);
    assert_eq!(status.layout_hash, layout_hash());
    assert_eq!(status.inference_count, 1);
    assert!(status.last_error.is_none());

    let info = service.model_info().unwrap();
    assert_eq!(info.model_type, "fixed");
    assert_eq!(info.feature_names.len(), FEATURE_COUNT);
    assert_eq!(info.artifact_id, status.artifact_id.unwrap());
}

/// Trains a three-guard softmax bundle and writes it under `tmp`
fn saved_bundle(tmp: &tempfile::TempDir) -> std::path::PathBuf {
    let dir = tmp.path().join("bundle");
    let corpus: Vec<_> = (0..30)
        .map(|i| CircuitObservation {
            circuit_id: None,
            guard: Some(RelayInfo::new(&guard_fp(i % 3), "US", 2.0 + (i % 3) as f64 * 3.0)),
            middle: RelayInfo::new("M1", "DE", 4.0),
            exit: RelayInfo::new(&format!("E{}", i % 3), "FR", 3.0),
            setup_duration: 1.0,
            total_bytes: 1e6,
            status: None,
            purpose: None,
            timestamp: None,
            build_time: None,
        })
        .collect();
    let config = TrainingConfig {
        max_epochs: 30,
        ..TrainingConfig::default()
    };
    let mut trained = train_softmax(&corpus, &config).unwrap();
    save_bundle(&mut trained, &dir).unwrap();
    dir
}

#[test]
fn test_load_from_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = saved_bundle(&tmp);

    let service: PredictionService = PredictionService::new(ServiceSettings::default());
    service.load_from_dir(&dir, None, None).unwrap();

    let result = service.predict(&PredictionRequest::new("E1", "FR", 3.0, 1.0)).unwrap();
    assert_eq!(result.predictions.len(), 3);
    let total: f64 = result.predictions.iter().map(|p| p.confidence).sum();
    assert!((total - 1.0).abs() < 1e-6);

    service.reload_from_dir(&dir, None).unwrap();
    assert_eq!(service.state(), ServiceState::Ready);
}

#[test]
fn test_unreadable_metadata_degrades_to_placeholders() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = saved_bundle(&tmp);
    let missing = tmp.path().join("no_such_meta.csv");

    let service: PredictionService = PredictionService::new(ServiceSettings::default());
    service.load_from_dir(&dir, Some(&missing), None).unwrap();
    assert_eq!(service.state(), ServiceState::Ready);

    let result = service.predict(&PredictionRequest::new("E1", "FR", 3.0, 1.0)).unwrap();
    assert_eq!(result.predictions.len(), 3);
    for p in &result.predictions {
        assert_eq!(p.nickname, format!("GuardNode{:03}", p.class_index));
    }

    // Same on reload, and a ragged file still loads its good rows
    service.reload_from_dir(&dir, Some(&missing)).unwrap();
    assert_eq!(service.state(), ServiceState::Ready);

    let ragged = tmp.path().join("ragged.csv");
    std::fs::write(
        &ragged,
        format!("guard_fingerprint,guard_nickname\nXYZ,bad,extra\n{},first\n", guard_fp(0)),
    )
    .unwrap();
    service.reload_from_dir(&dir, Some(&ragged)).unwrap();
    let result = service.predict(&PredictionRequest::new("E1", "FR", 3.0, 1.0)).unwrap();
    let first = result.predictions.iter().find(|p| p.class_index == 0).unwrap();
    assert_eq!(first.nickname, "first");
}

#[test]
fn test_load_from_missing_directory_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let service: PredictionService = PredictionService::new(ServiceSettings::default());
    assert!(service.load_from_dir(&tmp.path().join("nope"), None, None).is_err());
    assert_eq!(service.state(), ServiceState::Failed);
}
