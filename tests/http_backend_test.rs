//! HTTP client tests against a local stand-in for the control service.

use circuit_daq::api::{DaqBackend, DischargeRequest, HttpBackend, StartAdcRequest};
use circuit_daq::error::DaqError;
use circuit_daq::relay_map::RelayId;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Received {
    method: Method,
    target: String,
    body: Vec<u8>,
}

type Log = Arc<Mutex<Vec<Received>>>;

async fn handle(req: Request<Body>, log: Log) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_default();
    let body = hyper::body::to_bytes(req.into_body())
        .await
        .map(|b| b.to_vec())
        .unwrap_or_default();
    log.lock().unwrap().push(Received {
        method: method.clone(),
        target,
        body,
    });

    let (status, body) = match (method, path.as_str()) {
        (Method::POST, "/api/relays/multiple") => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"detail": "Relay board not responding"}),
        ),
        (Method::POST, "/api/stop-read-adc") => (
            StatusCode::OK,
            json!({
                "status": "success",
                "samples": 3,
                "sample_rate": 200,
                "channels": 4,
                "data": {
                    "adc1": [0.1, 0.2, 0.3],
                    "adc2": [0.0, 0.0, 0.0],
                    "adc3": [1.0, 1.0, 1.0],
                    "adc4": [0.5, 0.5, 0.5]
                },
                "timestamp": "2026-10-19T10:00:00"
            }),
        ),
        (Method::GET, "/api/adc-status") => (
            StatusCode::OK,
            json!({"is_running": true, "configuration": {"samples": 1000}}),
        ),
        (Method::GET, "/api/relays") => (StatusCode::OK, json!({"relays": ["zs1_1", "zk1_5"]})),
        (Method::POST, "/api/charge-capacitor") => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            (StatusCode::OK, json!({"status": "success"}))
        }
        _ => (StatusCode::OK, json!({"status": "success"})),
    };

    Ok(Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap())
}

async fn serve() -> (SocketAddr, Log) {
    let log: Log = Arc::default();
    let shared = log.clone();
    let make_svc = make_service_fn(move |_conn| {
        let log = shared.clone();
        async move { Ok::<_, Infallible>(service_fn(move |req| handle(req, log.clone()))) }
    });

    let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
    let addr = server.local_addr();
    tokio::spawn(server);
    (addr, log)
}

fn backend(addr: SocketAddr) -> HttpBackend {
    HttpBackend::new(&format!("http://{}", addr), Duration::from_millis(500)).unwrap()
}

fn last(log: &Log) -> Received {
    log.lock().unwrap().last().cloned().unwrap()
}

#[tokio::test]
async fn discharge_posts_json_body() {
    let (addr, log) = serve().await;
    let request = DischargeRequest {
        capacitor: "cs3".into(),
        discharge_resistor: "rz2".into(),
        duration: 0.5,
    };
    backend(addr).discharge_capacitor(&request).await.unwrap();

    let received = last(&log);
    assert_eq!(received.method, Method::POST);
    assert_eq!(received.target, "/api/discharge-capacitor");
    let body: Value = serde_json::from_slice(&received.body).unwrap();
    assert_eq!(
        body,
        json!({"capacitor": "cs3", "discharge_resistor": "rz2", "duration": 0.5})
    );
}

#[tokio::test]
async fn start_adc_sends_query_parameters() {
    let (addr, log) = serve().await;
    let request = StartAdcRequest {
        samples: 1000,
        sample_rate: 200,
        measurement_time: 5.0,
    };
    backend(addr).start_adc(&request).await.unwrap();

    assert_eq!(
        last(&log).target,
        "/api/start-read-adc?samples=1000&sample_rate=200&measurement_time=5"
    );
}

#[tokio::test]
async fn single_relay_uses_path_parameters() {
    let (addr, log) = serve().await;
    let backend = backend(addr);
    backend.set_relay(&RelayId::from("zs1_1"), true).await.unwrap();
    assert_eq!(last(&log).target, "/api/relay/zs1_1/true");

    backend.set_relay(&RelayId::from("zs1_1"), false).await.unwrap();
    assert_eq!(last(&log).target, "/api/relay/zs1_1/false");
}

#[tokio::test]
async fn non_success_status_carries_backend_detail() {
    let (addr, log) = serve().await;
    let mut states = BTreeMap::new();
    states.insert(RelayId::from("zk1_5"), true);

    let err = backend(addr).set_relays(&states).await.unwrap_err();
    match err {
        DaqError::RemoteStatus {
            endpoint,
            status,
            detail,
        } => {
            assert_eq!(endpoint, "/api/relays/multiple");
            assert_eq!(status, 500);
            assert_eq!(detail, "Relay board not responding");
        }
        other => panic!("unexpected error: {other}"),
    }

    let body: Value = serde_json::from_slice(&last(&log).body).unwrap();
    assert_eq!(body, json!({"relay_states": {"zk1_5": true}}));
}

#[tokio::test]
async fn stop_adc_returns_capture() {
    let (addr, _log) = serve().await;
    let capture = backend(addr).stop_adc().await.unwrap();
    assert_eq!(capture.samples, 3);
    assert_eq!(capture.sample_rate, Some(200.0));
    assert_eq!(capture.data.adc1, vec![0.1, 0.2, 0.3]);
}

#[tokio::test]
async fn status_and_relay_listing() {
    let (addr, _log) = serve().await;
    let backend = backend(addr);
    assert!(backend.adc_status().await.unwrap().is_running);
    assert_eq!(
        backend.relays().await.unwrap(),
        vec![RelayId::from("zs1_1"), RelayId::from("zk1_5")]
    );
}

#[tokio::test]
async fn slow_backend_times_out() {
    let (addr, _log) = serve().await;
    let backend = HttpBackend::new(&format!("http://{}", addr), Duration::from_millis(100)).unwrap();

    let err = backend.charge_capacitor().await.unwrap_err();
    assert!(matches!(err, DaqError::Timeout(ref endpoint) if endpoint == "/api/charge-capacitor"));
}

#[tokio::test]
async fn unreachable_backend_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = backend(addr).adc_status().await.unwrap_err();
    assert!(matches!(err, DaqError::Http(_)), "{err}");
}
