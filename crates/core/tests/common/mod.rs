#![allow(dead_code)]

use geoband::{
    AreaPolygon, BoundingBox, FetchedEvent, Period, QueryRequest, QueryService, ServiceError,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Responder = dyn Fn(&QueryRequest) -> Result<Vec<FetchedEvent>, ServiceError> + Send + Sync;

/// Query service answering from a closure and recording every request.
pub struct MockService {
    respond: Box<Responder>,
    latency: Duration,
    requests: Mutex<Vec<QueryRequest>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockService {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&QueryRequest) -> Result<Vec<FetchedEvent>, ServiceError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every request answered with `count` events unique to its area and
    /// period.
    pub fn always(count: usize) -> Self {
        Self::new(move |request| {
            Ok(events(
                &format!("{}@{}", request.polygon, request.period),
                count,
            ))
        })
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn requests(&self) -> Vec<QueryRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl QueryService for MockService {
    async fn query(&self, request: QueryRequest) -> Result<Vec<FetchedEvent>, ServiceError> {
        self.requests.lock().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = (self.respond)(&request);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// `count` events with ids unique to `prefix`.
pub fn events(prefix: &str, count: usize) -> Vec<FetchedEvent> {
    (0..count)
        .map(|i| FetchedEvent {
            external_id: Some(format!("{}#{}", prefix, i)),
            category: "violent-crime".to_string(),
            latitude: Some(51.5),
            longitude: Some(-0.1),
            location_label: "On or near Shopping Area".to_string(),
            period: "2024-01".to_string(),
        })
        .collect()
}

/// Bounds of the box a request was made for.
pub fn request_bounds(request: &QueryRequest) -> BoundingBox {
    let polygon: AreaPolygon = request.polygon.parse().expect("valid polygon key");
    polygon.bounds().expect("valid polygon bounds")
}

pub fn london() -> BoundingBox {
    BoundingBox::new(51.7, 51.3, 0.3, -0.5).expect("valid box")
}

pub fn period(s: &str) -> Period {
    s.parse().expect("valid period")
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
