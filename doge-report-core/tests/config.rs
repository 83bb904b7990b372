use doge_report_core::config::{
    Endpoint, ExportFormat, FetchConfig, ResultShape, STATISTICS_DIMENSIONS,
};
use std::time::Duration;

#[test]
fn catalogue_maps_names_to_paths_and_result_keys() {
    let rows: Vec<(&str, &str, &str)> = Endpoint::ALL
        .iter()
        .map(|e| (e.name(), e.path(), e.result_key()))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("grants", "/savings/grants", "grants"),
            ("contracts", "/savings/contracts", "contracts"),
            ("leases", "/savings/leases", "leases"),
            ("payments", "/payments", "payments"),
            ("statistics", "/payments/statistics", "statistics"),
        ]
    );
}

#[test]
fn only_statistics_has_dimensions() {
    assert_eq!(
        Endpoint::Statistics.shape(),
        ResultShape::Dimensions {
            prefix: "statistics",
            names: STATISTICS_DIMENSIONS
        }
    );
    assert_eq!(
        Endpoint::Payments.shape(),
        ResultShape::Single { key: "payments" }
    );
}

#[test]
fn endpoint_names_round_trip_through_from_str() {
    for endpoint in Endpoint::ALL {
        assert_eq!(endpoint.to_string().parse::<Endpoint>(), Ok(endpoint));
    }
    assert!("savings".parse::<Endpoint>().is_err());
}

#[test]
fn fetch_defaults() {
    let config = FetchConfig::default();
    assert_eq!(config.base_url, "https://api.doge.gov");
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.timeout, Duration::from_secs(30));
    assert_eq!(ExportFormat::default(), ExportFormat::Json);
}
