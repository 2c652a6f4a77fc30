#[cfg(test)]
mod tests {
    use crate::error::{BackendError, QueryError};
    use crate::request::ByDimensionRequest;
    use crate::response::PrimaryDimension;
    use crate::timerange::JsTime;
    use crate::translator::{QueryTranslator, SearchBackend};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use mockall::*;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    mock! {
        pub Backend {}
        #[async_trait]
        impl SearchBackend for Backend {
            async fn search(&self, index: &str, body: &Value) -> Result<Value, BackendError>;
        }
    }

    fn translator(backend: MockBackend) -> QueryTranslator {
        QueryTranslator::new(Arc::new(backend), "packetbeat-unittest").unwrap()
    }

    fn request(body: Value) -> ByDimensionRequest {
        serde_json::from_value(body).unwrap()
    }

    fn by_name(primary: &[PrimaryDimension]) -> HashMap<String, PrimaryDimension> {
        primary
            .iter()
            .map(|p| (p.name.clone(), p.clone()))
            .collect()
    }

    /// What the store answers for two services holding three records:
    /// (service1, ok, rt 2000, count 2), (service2, ok, rt 2000, count 4)
    /// and (service1, error, rt 2100, count 3).
    fn two_services(errors_service1: f64, errors_service2: f64) -> Value {
        json!({"took": 2, "timed_out": false, "aggregations": {"primary": {
            "doc_count_error_upper_bound": 0,
            "sum_other_doc_count": 0,
            "buckets": [
                {
                    "key": "service1",
                    "doc_count": 2,
                    "volume": {"value": 5.0},
                    "rt_stats": {"count": 2, "min": 2000.0, "max": 2100.0, "avg": 2050.0, "sum": 4100.0},
                    "rt_percentiles": {"values": {"50.0": 2050.0, "99.995": 2100.0}},
                    "secondary_card": {"value": 2},
                    "errors_count": {"doc_count": 1, "count": {"value": errors_service1}}
                },
                {
                    "key": "service2",
                    "doc_count": 1,
                    "volume": {"value": 4.0},
                    "rt_stats": {"count": 1, "min": 2000.0, "max": 2000.0, "avg": 2000.0, "sum": 2000.0},
                    "rt_percentiles": {"values": {"50.0": 2000.0, "99.995": 2000.0}},
                    "secondary_card": {"value": 1},
                    "errors_count": {"doc_count": 0, "count": {"value": errors_service2}}
                }
            ]
        }}})
    }

    #[tokio::test]
    async fn test_all_metrics_for_two_services() {
        let mut mock_backend = MockBackend::new();
        mock_backend
            .expect_search()
            .withf(|index, body| {
                index == "packetbeat-unittest"
                    && body["aggs"]["primary"]["terms"]["field"] == "service"
                    && body["aggs"]["primary"]["aggs"]["rt_percentiles"]["percentiles"]["percents"]
                        == json!([50.0, 99.995])
            })
            .times(1)
            .returning(|_, _| Ok(two_services(3.0, 0.0)));

        let req = request(json!({
            "from": "now-1d",
            "to": "now",
            "metrics": ["volume", "rt_avg", "rt_max", "rt_percentiles", "secondary_count", "errors_rate"],
            "config": {"percentiles": [50, 99.995]}
        }));

        let resp = translator(mock_backend).query(req).await.unwrap();
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.primary.len(), 2);

        let services = by_name(&resp.primary);
        let s1 = &services["service1"].metrics;
        let s2 = &services["service2"].metrics;

        assert_eq!(s1["volume"], 5.0);
        assert_eq!(s2["volume"], 4.0);
        assert_eq!(s1["rt_max"], 2100.0);
        assert_eq!(s2["rt_max"], 2000.0);
        assert_eq!(s1["rt_avg"], 2050.0);
        assert_eq!(s2["rt_avg"], 2000.0);
        assert_eq!(s1["rt_50.0p"], 2050.0);
        assert_eq!(s2["rt_50.0p"], 2000.0);
        assert_eq!(s2["rt_99.995p"], 2000.0);
        assert_eq!(s1["secondary_count"], 2.0);
        assert_eq!(s2["secondary_count"], 1.0);
        assert!((s1["errors_rate"] - 0.6).abs() < 1e-6);
        assert_eq!(s2["errors_rate"], 0.0);
    }

    #[tokio::test]
    async fn test_group_order_follows_backend() {
        let mut mock_backend = MockBackend::new();
        mock_backend.expect_search().times(1).returning(|_, _| {
            Ok(json!({"aggregations": {"primary": {"buckets": [
                {"key": "zeta", "volume": {"value": 1.0}},
                {"key": "alpha", "volume": {"value": 9.0}},
                {"key": "mid", "volume": {"value": 4.0}}
            ]}}}))
        });

        let resp = translator(mock_backend)
            .query(request(json!({"metrics": ["volume"]})))
            .await
            .unwrap();
        let names: Vec<&str> = resp.primary.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_errors_rate_alone_requests_volume() {
        let mut mock_backend = MockBackend::new();
        mock_backend
            .expect_search()
            .withf(|_, body| {
                let aggs = &body["aggs"]["primary"]["aggs"];
                aggs.get("volume").is_some() && aggs.get("errors_count").is_some()
            })
            .times(1)
            .returning(|_, _| Ok(two_services(3.0, 0.0)));

        let resp = translator(mock_backend)
            .query(request(json!({"metrics": ["errors_rate"]})))
            .await
            .unwrap();
        let services = by_name(&resp.primary);
        assert!((services["service1"].metrics["errors_rate"] - 0.6).abs() < 1e-6);
        assert_eq!(services["service2"].metrics["errors_rate"], 0.0);
        assert!(!services["service1"].metrics.contains_key("volume"));
    }

    /// (service, status, count) for the same three records as above.
    const RECORDS: [(&str, &str, f64); 3] = [
        ("service1", "ok", 2.0),
        ("service2", "ok", 4.0),
        ("service1", "error", 3.0),
    ];

    /// Answers a volume/errors_count search by applying the body's
    /// `must_not` term to `RECORDS`, the way the store would.
    fn answer_from_records(body: &Value) -> Value {
        let aggs = &body["aggs"]["primary"]["aggs"];
        let term = aggs["errors_count"]["filter"]["bool"]["must_not"]["term"]
            .as_object()
            .unwrap();
        let ok_value = term["status"].as_str().unwrap();

        let buckets: Vec<Value> = ["service1", "service2"]
            .iter()
            .map(|service| {
                let rows = RECORDS.iter().filter(|(s, _, _)| s == service);
                let volume: f64 = rows.clone().map(|(_, _, count)| count).sum();
                let errors: f64 = rows
                    .filter(|(_, status, _)| *status != ok_value)
                    .map(|(_, _, count)| count)
                    .sum();
                json!({
                    "key": service,
                    "volume": {"value": volume},
                    "errors_count": {"count": {"value": errors}}
                })
            })
            .collect();
        json!({"aggregations": {"primary": {"buckets": buckets}}})
    }

    fn sums_configured_count_field(body: &Value, field: &str) -> bool {
        let aggs = &body["aggs"]["primary"]["aggs"];
        aggs["volume"]["sum"]["field"] == field
            && aggs["errors_count"]["aggs"]["count"]["sum"]["field"] == field
    }

    #[tokio::test]
    async fn test_errors_rate_follows_ok_status_filter() {
        let mut mock_backend = MockBackend::new();
        mock_backend
            .expect_search()
            .withf(|_, body| {
                body["aggs"]["primary"]["aggs"]["errors_count"]["filter"]["bool"]["must_not"]["term"]
                    == json!({"status": "ok"})
                    && sums_configured_count_field(body, "hits")
            })
            .times(1)
            .returning(|_, body| Ok(answer_from_records(body)));

        let req = request(json!({
            "metrics": ["errors_rate"],
            "config": {"count_field": "hits"}
        }));
        let resp = translator(mock_backend).query(req).await.unwrap();
        let services = by_name(&resp.primary);
        assert!((services["service1"].metrics["errors_rate"] - 0.6).abs() < 1e-6);
        assert_eq!(services["service2"].metrics["errors_rate"], 0.0);
    }

    #[tokio::test]
    async fn test_errors_rate_is_one_when_nothing_succeeds() {
        let mut mock_backend = MockBackend::new();
        mock_backend
            .expect_search()
            .withf(|_, body| {
                body["aggs"]["primary"]["aggs"]["errors_count"]["filter"]["bool"]["must_not"]["term"]
                    == json!({"status": "nothing"})
                    && sums_configured_count_field(body, "count")
            })
            .times(1)
            .returning(|_, body| Ok(answer_from_records(body)));

        let req = request(json!({
            "metrics": ["errors_rate"],
            "config": {"status_value_ok": "nothing"}
        }));
        let resp = translator(mock_backend).query(req).await.unwrap();
        let services = by_name(&resp.primary);
        assert!((services["service1"].metrics["errors_rate"] - 1.0).abs() < 1e-6);
        assert!((services["service2"].metrics["errors_rate"] - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_errors_rate_without_traffic_is_zero() {
        let mut mock_backend = MockBackend::new();
        mock_backend.expect_search().times(1).returning(|_, _| {
            Ok(json!({"aggregations": {"primary": {"buckets": [
                {
                    "key": "idle",
                    "doc_count": 0,
                    "volume": {"value": null},
                    "errors_count": {"doc_count": 0, "count": {"value": null}}
                },
                {
                    "key": "quiet",
                    "doc_count": 1,
                    "volume": {"value": 0.0},
                    "errors_count": {"doc_count": 0, "count": {"value": 0.0}}
                }
            ]}}}))
        });

        let (result, status) = translator(mock_backend)
            .query_with_status(request(json!({"metrics": ["volume", "errors_rate"]})))
            .await;
        assert_eq!(status, 200);
        let services = by_name(&result.unwrap().primary);
        for name in ["idle", "quiet"] {
            assert_eq!(services[name].metrics["volume"], 0.0);
            assert_eq!(services[name].metrics["errors_rate"], 0.0);
        }
    }

    #[tokio::test]
    async fn test_unusable_end_time_never_reaches_backend() {
        let mut mock_backend = MockBackend::new();
        mock_backend.expect_search().never();

        let mut req = request(json!({"metrics": ["volume"]}));
        req.timerange.to = Some(JsTime(DateTime::<Utc>::MIN_UTC));
        let (result, status) = translator(mock_backend).query_with_status(req).await;
        assert!(matches!(result, Err(QueryError::InvalidRequest(_))));
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn test_unknown_metric_never_reaches_backend() {
        let mut mock_backend = MockBackend::new();
        mock_backend.expect_search().never();
        let translator = translator(mock_backend);

        let (result, status) = translator
            .query_with_status(request(json!({"metrics": ["something"]})))
            .await;
        assert!(matches!(result, Err(QueryError::UnknownMetric(_))));
        assert_eq!(status, 400);

        let (result, status) = translator
            .query_with_status(request(json!({"metrics": ["volume"], "histogram_metrics": ["rt_max"]})))
            .await;
        assert!(matches!(result, Err(QueryError::UnknownHistogramMetric(_))));
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn test_invalid_histogram_points_never_reach_backend() {
        let mut mock_backend = MockBackend::new();
        mock_backend.expect_search().never();

        let req = request(json!({
            "histogram_metrics": ["volume"],
            "config": {"histogram_points": -2}
        }));
        let (result, status) = translator(mock_backend).query_with_status(req).await;
        assert!(result.is_err());
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn test_volume_histogram() {
        let mut mock_backend = MockBackend::new();
        mock_backend
            .expect_search()
            .withf(|_, body| {
                body["aggs"]["primary"]["aggs"]["volume_hist"]["date_histogram"]["fixed_interval"]
                    == "60.000s"
            })
            .times(1)
            .returning(|_, _| {
                Ok(json!({"aggregations": {"primary": {"buckets": [
                    {
                        "key": "service1",
                        "doc_count": 2,
                        "volume_hist": {"buckets": [
                            {"key_as_string": "2015-01-02T15:03:00.000Z", "key": 1420210980000i64,
                             "doc_count": 0, "volume": {"value": 0.0}},
                            {"key_as_string": "2015-01-02T15:04:00.000Z", "key": 1420211040000i64,
                             "doc_count": 2, "volume": {"value": 5.0}}
                        ]}
                    },
                    {
                        "key": "service2",
                        "doc_count": 1,
                        "volume_hist": {"buckets": [
                            {"key_as_string": "2015-01-02T15:04:00.000Z", "key": 1420211040000i64,
                             "doc_count": 1, "volume": {"value": 4.0}}
                        ]}
                    }
                ]}}}))
            });

        // two minutes, one point per minute
        let req = request(json!({
            "from": "2015-01-02T15:03:00.000Z",
            "to": "2015-01-02T15:05:00.000Z",
            "histogram_metrics": ["volume"],
            "config": {"histogram_points": 2}
        }));
        let resp = translator(mock_backend).query(req).await.unwrap();
        let services = by_name(&resp.primary);

        let hist = &services["service1"].hist_metrics["volume"];
        assert_eq!(hist.len(), 1);
        assert_eq!(hist[0].value, 5.0);
        assert_eq!(hist[0].ts.to_string(), "2015-01-02T15:04:00.000Z");
        assert!(services["service1"].metrics.is_empty());
    }

    #[tokio::test]
    async fn test_missing_index_is_server_error() {
        let mut mock_backend = MockBackend::new();
        mock_backend.expect_search().times(1).returning(|_, _| {
            Err(BackendError::Status {
                status: 404,
                body: r#"{"error":{"type":"index_not_found_exception"}}"#.to_string(),
            })
        });

        let (result, status) = translator(mock_backend)
            .query_with_status(request(json!({"metrics": ["volume"]})))
            .await;
        assert!(matches!(result, Err(QueryError::Backend(_))));
        assert_eq!(status, 500);
    }

    #[tokio::test]
    async fn test_unexpected_response_is_server_error() {
        let mut mock_backend = MockBackend::new();
        mock_backend
            .expect_search()
            .times(1)
            .returning(|_, _| Ok(json!({"hits": {"total": 0}})));

        let (result, status) = translator(mock_backend)
            .query_with_status(request(json!({"metrics": ["volume"]})))
            .await;
        assert!(matches!(result, Err(QueryError::MalformedResponse(_))));
        assert_eq!(status, 500);
    }

    #[tokio::test]
    async fn test_missing_sub_result_is_server_error() {
        let mut mock_backend = MockBackend::new();
        mock_backend.expect_search().times(1).returning(|_, _| {
            Ok(json!({"aggregations": {"primary": {"buckets": [
                {"key": "service1", "doc_count": 1}
            ]}}}))
        });

        let (_, status) = translator(mock_backend)
            .query_with_status(request(json!({"metrics": ["rt_max"]})))
            .await;
        assert_eq!(status, 500);
    }

    struct SlowBackend;

    #[async_trait]
    impl SearchBackend for SlowBackend {
        async fn search(&self, _index: &str, _body: &Value) -> Result<Value, BackendError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!({}))
        }
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let translator = QueryTranslator::new(Arc::new(SlowBackend), "packetbeat")
            .unwrap()
            .with_timeout(Duration::from_millis(50));

        let (result, status) = translator
            .query_with_status(request(json!({"metrics": ["volume"]})))
            .await;
        assert!(matches!(result, Err(QueryError::Timeout(_))));
        assert_eq!(status, 500);
    }

    #[tokio::test]
    async fn test_empty_result() {
        let mut mock_backend = MockBackend::new();
        mock_backend
            .expect_search()
            .times(1)
            .returning(|_, _| Ok(json!({"aggregations": {"primary": {"buckets": []}}})));

        let resp = translator(mock_backend)
            .query(request(json!({"metrics": ["volume"]})))
            .await
            .unwrap();
        assert_eq!(resp.status, "ok");
        assert!(resp.primary.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_queries_share_translator() {
        let mut mock_backend = MockBackend::new();
        mock_backend
            .expect_search()
            .times(8)
            .returning(|_, _| Ok(two_services(3.0, 0.0)));
        let translator = Arc::new(translator(mock_backend));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let translator = Arc::clone(&translator);
                tokio::spawn(async move {
                    translator
                        .query(request(json!({"metrics": ["volume", "errors_rate"]})))
                        .await
                })
            })
            .collect();

        for handle in handles {
            let resp = handle.await.unwrap().unwrap();
            assert_eq!(resp.primary.len(), 2);
        }
    }
}
