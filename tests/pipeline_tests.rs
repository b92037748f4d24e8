use std::io::Write;
use std::str::FromStr;

use breaking_bias::data::loader::load_file;
use breaking_bias::data::model::columns;
use breaking_bias::pipeline::{aggregate, format};
use breaking_bias::{
    CellValue, ConfusionLabel, MovingAverageForecaster, PipelineError, RecordSet,
    RecordTransformer, Route, SeriesService,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{Value, json};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn write_csv(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/// Three rows: a TP, a biased FP and a TN, spread over Jan 1 and Jan 3.
fn worked_example() -> RecordSet {
    let file = write_csv(
        "Timestamp,Transaction_Amount_USD,confusion_value,Bias,Gender,Race\n\
         2024-01-01 10:00:00,10,TP,0,Female,Asian\n\
         2024-01-01 15:30:00,5,FP,1,Male,Black\n\
         2024-01-03 09:15:00,20,TN,0,Female,White\n",
    );
    load_file(file.path()).unwrap()
}

fn pairs(series: &breaking_bias::MetricSeries) -> Vec<(NaiveDate, Decimal)> {
    series.points().iter().map(|p| (p.date, p.value)).collect()
}

#[test]
fn worked_example_unbias_aggregate_and_gap_fill() {
    let unbiased = RecordTransformer::new(&worked_example()).unbias().unwrap();
    assert_eq!(
        unbiased.records().value(1, columns::CONFUSION),
        Some(&CellValue::Label(ConfusionLabel::TN))
    );
    assert_eq!(unbiased.records().value(1, columns::BIAS), Some(&CellValue::Integer(0)));

    let cleaned = unbiased.clean().unwrap();
    let (frequency, revenue) = aggregate::aggregate(cleaned.records()).unwrap();
    assert_eq!(
        pairs(&frequency),
        vec![(day(1), Decimal::from(2)), (day(3), Decimal::from(1))]
    );
    assert_eq!(
        pairs(&revenue),
        vec![(day(1), Decimal::from(15)), (day(3), Decimal::from(20))]
    );

    let (dense_frequency, dense_revenue) = format::for_predicting(&frequency, &revenue).unwrap();
    for dense in [&dense_frequency, &dense_revenue] {
        assert_eq!(dense.len(), 3);
        assert_eq!(dense.get(day(2)), Some(Decimal::ZERO));
    }
    assert_eq!(
        dense_revenue.values().values().copied().sum::<Decimal>(),
        revenue.total().unwrap()
    );
}

#[test]
fn frequency_and_revenue_totals_match_rows() {
    let records = worked_example();
    let amount_total: Decimal = records
        .rows()
        .iter()
        .filter_map(|r| r[1].as_decimal())
        .sum();

    let transformer = RecordTransformer::new(&records);
    let frequency = transformer.clone().frequency_series().unwrap();
    let revenue = transformer.revenue_series().unwrap();

    assert_eq!(frequency.total().unwrap(), Decimal::from(records.len() as i64));
    assert_eq!(revenue.total().unwrap(), amount_total);
}

#[test]
fn service_past_data_biased_vs_unbiased() {
    let service = SeriesService::new(worked_example(), MovingAverageForecaster::new(3), 30);
    let body = json!({"filtering_factor": ["NoFilter", "NoFilter"]});

    // Biased view: only the TN row went through.
    let biased = service.handle(Route::PastData, &body).unwrap();
    assert_eq!(
        biased["frequency"],
        json!([{"date": "2024-01-03", "frequency": 1}])
    );

    // Unbiased view: the biased FP is recovered as a valid transaction.
    let unbiased = service.handle(Route::PastDataUnbiased, &body).unwrap();
    assert_eq!(
        unbiased["frequency"],
        json!([
            {"date": "2024-01-01", "frequency": 1},
            {"date": "2024-01-03", "frequency": 1}
        ])
    );
    let revenue: Vec<f64> = unbiased["revenue"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["revenue"].as_f64().unwrap())
        .collect();
    assert_eq!(revenue, vec![5.0, 20.0]);
}

#[test]
fn service_filters_by_demographics() {
    let service = SeriesService::new(worked_example(), MovingAverageForecaster::default(), 30);
    let body = json!({"filtering_factor": {"gender": "Male"}});

    let response = service.handle(Route::PastDataUnbiased, &body).unwrap();
    assert_eq!(
        response["frequency"],
        json!([{"date": "2024-01-01", "frequency": 1}])
    );
}

#[test]
fn service_predicts_following_days() {
    let service = SeriesService::new(worked_example(), MovingAverageForecaster::new(3), 30);
    let body = json!({"filtering_factor": [null, null], "num_points": 2});

    let response = service.handle(Route::PredictDataUnbiased, &body).unwrap();
    let frequency = response["frequency_graph"].as_array().unwrap();
    assert_eq!(frequency.len(), 2);
    assert_eq!(frequency[0]["date"], Value::from("2024-01-04"));
    assert_eq!(frequency[1]["date"], Value::from("2024-01-05"));
    // Dense history is [1, 0, 1]; the first prediction is its mean.
    let first = frequency[0]["frequency"].as_f64().unwrap();
    assert!((first - 2.0 / 3.0).abs() < 1e-9);

    assert_eq!(response["revenue_graph"].as_array().unwrap().len(), 2);
}

#[test]
fn service_rejects_bad_requests() {
    let service = SeriesService::new(worked_example(), MovingAverageForecaster::default(), 30);

    let missing_points = service.handle(Route::PredictData, &json!({"filtering_factor": []}));
    assert!(matches!(missing_points, Err(PipelineError::Input(_))));

    let too_far = service.handle(
        Route::PredictData,
        &json!({"filtering_factor": [], "num_points": 31}),
    );
    assert!(matches!(too_far, Err(PipelineError::Input(_))));

    // A wrongly cased key must not fall back to the whole population.
    let misspelled = service.handle(
        Route::PastData,
        &json!({"filtering_factor": {"Gender": "Male"}}),
    );
    assert!(matches!(misspelled, Err(PipelineError::Input(_))));

    // Service state is untouched by failed requests.
    assert_eq!(service.records(), &worked_example());
}

#[test]
fn forecasting_with_no_valid_history_is_an_input_error() {
    let service = SeriesService::new(worked_example(), MovingAverageForecaster::default(), 30);
    let body = json!({"filtering_factor": ["Male", null], "num_points": 3});

    // The only male transaction is a blocked FP in the biased view.
    let response = service.handle(Route::PredictData, &body);
    assert!(matches!(response, Err(PipelineError::Input(_))));

    let zero_points = json!({"filtering_factor": ["Male", null], "num_points": 0});
    let response = service.handle(Route::PredictData, &zero_points).unwrap();
    assert_eq!(response["frequency_graph"], json!([]));
    assert_eq!(response["revenue_graph"], json!([]));
}

#[test]
fn decimal_amounts_survive_the_pipeline() {
    let file = write_csv(
        "Timestamp,Transaction_Amount_USD,confusion_value,Bias\n\
         2024-01-01,0.10,TN,0\n\
         2024-01-01,0.20,TN,0\n",
    );
    let records = load_file(file.path()).unwrap();
    let revenue = RecordTransformer::new(&records).revenue_series().unwrap();
    assert_eq!(revenue.total().unwrap(), Decimal::from_str("0.3").unwrap());
}

#[test]
fn offset_timestamps_keep_their_local_date() {
    let file = write_csv(
        "Timestamp,Transaction_Amount_USD,confusion_value,Bias\n\
         2024-01-01T23:00:00-05:00,10,TN,0\n",
    );
    let records = load_file(file.path()).unwrap();
    let cleaned = RecordTransformer::new(&records).clean().unwrap();
    assert_eq!(
        cleaned.records().value(0, columns::DATE),
        Some(&CellValue::Date(day(1)))
    );
}
