//! Record sinks for scraped options and combinations

use async_trait::async_trait;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::model::{FlightOption, RoundTripCombination};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sink rejected record: {0}")]
    Rejected(String),
}

/// Destination for records as the engine produces them
#[async_trait]
pub trait FlightSink: Send {
    async fn record_option(&mut self, option: &FlightOption) -> Result<(), SinkError>;

    async fn record_combination(
        &mut self,
        combination: &RoundTripCombination,
    ) -> Result<(), SinkError>;
}

/// Keeps everything in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub options: Vec<FlightOption>,
    pub combinations: Vec<RoundTripCombination>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FlightSink for MemorySink {
    async fn record_option(&mut self, option: &FlightOption) -> Result<(), SinkError> {
        self.options.push(option.clone());
        Ok(())
    }

    async fn record_combination(
        &mut self,
        combination: &RoundTripCombination,
    ) -> Result<(), SinkError> {
        self.combinations.push(combination.clone());
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl FlightSink for NullSink {
    async fn record_option(&mut self, _option: &FlightOption) -> Result<(), SinkError> {
        Ok(())
    }

    async fn record_combination(
        &mut self,
        _combination: &RoundTripCombination,
    ) -> Result<(), SinkError> {
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JsonRecord<'a> {
    Option(&'a FlightOption),
    Combination(&'a RoundTripCombination),
}

/// Appends one JSON object per record to a file
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "Opened JSON lines sink");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_record(&mut self, record: &JsonRecord<'_>) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl FlightSink for JsonLinesSink {
    async fn record_option(&mut self, option: &FlightOption) -> Result<(), SinkError> {
        self.write_record(&JsonRecord::Option(option))
    }

    async fn record_combination(
        &mut self,
        combination: &RoundTripCombination,
    ) -> Result<(), SinkError> {
        self.write_record(&JsonRecord::Combination(combination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReturnFlightOption, Stops};
    use chrono::Utc;

    fn option() -> FlightOption {
        let text = "Nonstop 10:00 AM – 1:15 PM 3h 15m United $245";
        FlightOption::from_card_text(1, 0, text, Some("SFO"), Some("JFK")).unwrap()
    }

    fn combination() -> RoundTripCombination {
        RoundTripCombination {
            combination_id: 1,
            outbound: option(),
            return_flight: ReturnFlightOption::from_card_text(1, 0, "Nonstop Delta $199").unwrap(),
            total_price: Some("$444".to_string()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_memory_sink_collects() {
        let mut sink = MemorySink::new();
        tokio_test::block_on(async {
            sink.record_option(&option()).await.unwrap();
            sink.record_combination(&combination()).await.unwrap();
        });
        assert_eq!(sink.options.len(), 1);
        assert_eq!(sink.combinations[0].return_flight.stops, Stops::Nonstop);
    }

    #[test]
    fn test_json_lines_sink_appends() {
        let path =
            std::env::temp_dir().join(format!("roundtrip-sink-{}.jsonl", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let mut sink = JsonLinesSink::create(&path).unwrap();
        tokio_test::block_on(async {
            sink.record_option(&option()).await.unwrap();
            sink.record_combination(&combination()).await.unwrap();
        });

        let written = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<serde_json::Value> = written
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "option");
        assert_eq!(lines[0]["price_value"], 245);
        assert_eq!(lines[1]["kind"], "combination");
        assert_eq!(lines[1]["total_price"], "$444");

        std::fs::remove_file(&path).unwrap();
    }
}
