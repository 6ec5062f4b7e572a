use std::sync::atomic::AtomicU64;
use std::time::Instant;

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::Result;

type MsGauge = Gauge<f64, AtomicU64>;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FunctionLabels {
    pub name: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CallLabels {
    pub method: String,
    pub url: String,
}

/// Wall-clock accounting for pipeline functions and iControl calls.
///
/// Initialised once per process and immutable afterwards; consumers scrape
/// `render()` from whatever http endpoint the embedding binary exposes.
pub struct Metrics {
    registry: Registry,
    function_duration_total: Family<FunctionLabels, MsGauge>,
    function_duration_count: Family<FunctionLabels, MsGauge>,
    icontrol_total: Family<CallLabels, MsGauge>,
    icontrol_count: Family<CallLabels, MsGauge>,
}

lazy_static! {
    static ref METRICS: Metrics = Metrics::new();
}

impl Metrics {
    fn new() -> Self {
        let mut registry = Registry::default();
        let function_duration_total = Family::<FunctionLabels, MsGauge>::default();
        let function_duration_count = Family::<FunctionLabels, MsGauge>::default();
        let icontrol_total = Family::<CallLabels, MsGauge>::default();
        let icontrol_count = Family::<CallLabels, MsGauge>::default();
        registry.register(
            "function_duration_timecost_total",
            "time cost total(in milliseconds) of functions",
            function_duration_total.clone(),
        );
        registry.register(
            "function_duration_timecost_count",
            "time cost count of functions",
            function_duration_count.clone(),
        );
        registry.register(
            "bigip_icontrol_timecost_total",
            "time cost(in milliseconds) of bigip icontrol rest api calls",
            icontrol_total.clone(),
        );
        registry.register(
            "bigip_icontrol_timecost_count",
            "total number of bigip icontrol rest api calls",
            icontrol_count.clone(),
        );
        Metrics {
            registry,
            function_duration_total,
            function_duration_count,
            icontrol_total,
            icontrol_count,
        }
    }

    pub fn global() -> &'static Metrics {
        &METRICS
    }

    pub fn observe_function(&self, name: &str, millis: f64) {
        let labels = FunctionLabels { name: name.to_string() };
        self.function_duration_total.get_or_create(&labels).inc_by(millis);
        self.function_duration_count.get_or_create(&labels).inc();
    }

    pub fn observe_icontrol(&self, method: &str, url: &str, millis: f64) {
        let labels = CallLabels {
            method: method.to_string(),
            url: url.to_string(),
        };
        self.icontrol_total.get_or_create(&labels).inc_by(millis);
        self.icontrol_count.get_or_create(&labels).inc();
    }

    /// Text exposition of every registered gauge.
    pub fn render(&self) -> Result<String> {
        let mut buf = String::new();
        encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

/// RAII timer feeding the function gauges on drop.
pub struct FuncTimer {
    name: &'static str,
    start: Instant,
}

impl Drop for FuncTimer {
    fn drop(&mut self) {
        let millis = self.start.elapsed().as_secs_f64() * 1000.0;
        Metrics::global().observe_function(self.name, millis);
    }
}

pub fn time_it(name: &'static str) -> FuncTimer {
    FuncTimer {
        name,
        start: Instant::now(),
    }
}
