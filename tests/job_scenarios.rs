// End-to-end job scenarios against the public orchestrator API

use std::sync::Arc;
use std::time::Duration;
use talen_jobs::{
    FailureCode, InputTable, JobError, JobId, JobState, Orchestrator, Prediction, PredictionError,
    PredictionRequest, Predictor, ReferencePredictor, RowResult, Settings,
};

fn predictor_fn<F>(f: F) -> Arc<dyn Predictor>
where
    F: Fn(&PredictionRequest) -> Result<Prediction, PredictionError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn prediction_for(position: i64) -> Prediction {
    Prediction {
        spacer_start: position - 7,
        spacer_end: position + 8,
        left_talen: format!("L{}", position),
        right_talen: format!("R{}", position),
        left_rvd: "NI-HD".to_string(),
        right_rvd: "NN-NG".to_string(),
    }
}

/// Fails for the listed positions, sleeps a little so completion order varies
fn failing_at(positions: &'static [i64]) -> Arc<dyn Predictor> {
    predictor_fn(move |req| {
        std::thread::sleep(Duration::from_millis((req.position as u64 * 7) % 13));
        if positions.contains(&req.position) {
            Err(PredictionError::NoValidSpacer(req.position))
        } else {
            Ok(prediction_for(req.position))
        }
    })
}

fn settings(concurrency: usize) -> Settings {
    Settings {
        max_concurrent_tasks: concurrency,
        task_timeout_ms: Some(10_000),
        ..Settings::default()
    }
}

fn variant_table(positions: &[i64]) -> InputTable {
    let mut text = String::from("#sample\tposition\tref\tcoverage\taf\tnote\n");
    for (i, p) in positions.iter().enumerate() {
        text.push_str(&format!("S{}\t{}\tA\t{}\t0.25\tfree text {}\n", i, p, 100 + i, i));
    }
    InputTable::parse_tsv("variants.tsv", &text).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_rows_one_failure() {
    let orchestrator = Orchestrator::new(failing_at(&[200]), &settings(3));
    let id = orchestrator.submit(variant_table(&[100, 200, 300])).unwrap();

    let status = orchestrator.wait(&id).await.unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.rows_total, 3);
    assert_eq!(status.rows_succeeded, 2);
    assert_eq!(status.rows_failed, 1);
    assert!(status.error.is_some());

    let table = orchestrator.result(&id).unwrap();
    let positions: Vec<&str> = table.rows.iter().map(|r| r.fields[1].as_str()).collect();
    assert_eq!(positions, vec!["100", "200", "300"]);

    assert_eq!(table.rows[0].result, RowResult::Predicted(prediction_for(100)));
    match &table.rows[1].result {
        RowResult::Failed(detail) => assert_eq!(detail.code, FailureCode::PredictionFailure),
        other => panic!("expected failure marker, got {:?}", other),
    }
    assert_eq!(table.rows[2].result, RowResult::Predicted(prediction_for(300)));

    let tsv = table.to_tsv();
    let line_200 = tsv.lines().nth(2).unwrap();
    assert!(line_200.starts_with("S1\t200\tA\t101\t0.25\tfree text 1\tfailed\tprediction_failure"));
}

#[tokio::test]
async fn test_missing_coverage_column_rejected() {
    let orchestrator = Orchestrator::new(failing_at(&[]), &settings(2));
    let earlier = orchestrator.submit(variant_table(&[10])).unwrap();
    let before = orchestrator.wait(&earlier).await.unwrap();

    let bad = InputTable::parse_tsv("bad.tsv", "position\tref\taf\n10\tA\t0.5\n").unwrap();
    assert!(matches!(orchestrator.submit(bad), Err(JobError::MalformedInput(_))));

    assert_eq!(orchestrator.list().len(), 1);
    assert_eq!(orchestrator.status(&earlier).unwrap(), before);
}

#[tokio::test]
async fn test_result_before_completion_not_ready() {
    let orchestrator = Orchestrator::new(failing_at(&[]), &settings(2));
    let id = orchestrator.submit(variant_table(&[1, 2, 3])).unwrap();

    match orchestrator.result(&id) {
        Err(JobError::NotReady { job_id, state }) => {
            assert_eq!(job_id, id);
            assert_eq!(state, JobState::Running);
        }
        other => panic!("expected NotReady, got {:?}", other),
    }

    orchestrator.wait(&id).await.unwrap();
    assert!(orchestrator.result(&id).is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_does_not_change_output() {
    let positions: Vec<i64> = (1..=24).map(|i| i * 37).collect();
    static FAILS: [i64; 3] = [74, 333, 851];

    let serial = Orchestrator::new(failing_at(&FAILS), &settings(1));
    let id = serial.submit(variant_table(&positions)).unwrap();
    serial.wait(&id).await.unwrap();
    let serial_table = serial.result(&id).unwrap();

    let parallel = Orchestrator::new(failing_at(&FAILS), &settings(positions.len()));
    let id = parallel.submit(variant_table(&positions)).unwrap();
    parallel.wait(&id).await.unwrap();
    let parallel_table = parallel.result(&id).unwrap();

    assert_eq!(serial_table, parallel_table);
    assert_eq!(serial_table.len(), positions.len());
    let order: Vec<usize> = serial_table.rows.iter().map(|r| r.row_index).collect();
    assert_eq!(order, (0..positions.len()).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_injected_failure_leaves_other_rows_alone() {
    let positions = [11, 22, 33, 44, 55];

    let baseline = Orchestrator::new(failing_at(&[]), &settings(4));
    let id = baseline.submit(variant_table(&positions)).unwrap();
    baseline.wait(&id).await.unwrap();
    let clean = baseline.result(&id).unwrap();

    let injected = Orchestrator::new(failing_at(&[33]), &settings(4));
    let id = injected.submit(variant_table(&positions)).unwrap();
    injected.wait(&id).await.unwrap();
    let broken = injected.result(&id).unwrap();

    for k in [0, 1, 3, 4] {
        assert_eq!(clean.rows[k], broken.rows[k]);
    }
    assert!(!broken.rows[2].result.is_success());
    assert_eq!(broken.rows[2].fields, clean.rows[2].fields);
}

#[tokio::test]
async fn test_terminal_reads_are_idempotent() {
    let orchestrator = Orchestrator::new(failing_at(&[2]), &settings(2));
    let id = orchestrator.submit(variant_table(&[1, 2, 3, 4])).unwrap();
    orchestrator.wait(&id).await.unwrap();

    let status = orchestrator.status(&id).unwrap();
    let result = orchestrator.result(&id).unwrap();
    for _ in 0..5 {
        assert_eq!(orchestrator.status(&id).unwrap(), status);
        assert_eq!(orchestrator.result(&id).unwrap(), result);
    }
    assert_eq!(status.rows_succeeded + status.rows_failed, status.rows_total);
    assert_eq!(orchestrator.cancel(&id), Ok(false));
}

#[tokio::test]
async fn test_unknown_job_not_found() {
    let orchestrator = Orchestrator::new(failing_at(&[]), &settings(1));
    let id = JobId::from("00000000-0000-0000-0000-000000000000");
    assert!(matches!(orchestrator.status(&id), Err(JobError::NotFound(_))));
    assert!(matches!(orchestrator.result(&id), Err(JobError::NotFound(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reference_predictor_end_to_end() {
    // 1:T 2:C 3:A 4:G 5:G 6:C 7:A 8:T 9:T 10:C 11:A 12:G
    let predictor: Arc<dyn Predictor> = Arc::new(ReferencePredictor::new("toy", b"TCAGGCATTCAG"));
    let settings = Settings {
        arm_length: 3,
        spacer_min: 3,
        spacer_max: 3,
        ..settings(2)
    };
    let orchestrator = Orchestrator::new(predictor, &settings);

    let text = "pos\tref\tdp\tvaf\n6\tC\t40\t0.3\n6\tG\t40\t0.3\n2\tC\t10\t0.1\n99\tA\t5\t0.9\n6\tC\t40\t1.5\n";
    let table = InputTable::parse_tsv("toy.tsv", text).unwrap();
    let id = orchestrator.submit(table).unwrap();

    let status = orchestrator.wait(&id).await.unwrap();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!((status.rows_succeeded, status.rows_failed), (1, 4));

    let combined = orchestrator.result(&id).unwrap();
    match &combined.rows[0].result {
        RowResult::Predicted(p) => {
            assert_eq!((p.spacer_start, p.spacer_end), (5, 7));
            assert_eq!(p.left_rvd, "HD-NI-NN");
            assert_eq!(p.right_rvd, "NN-NI-NI");
        }
        other => panic!("expected prediction, got {:?}", other),
    }
    for row in &combined.rows[1..] {
        assert!(matches!(
            &row.result,
            RowResult::Failed(d) if d.code == FailureCode::PredictionFailure
        ));
    }
}
