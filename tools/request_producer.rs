//! Test Request Producer
//!
//! Generates synthetic patient records and sends them to the prediction
//! service over NATS, logging each reply.

use anyhow::Result;
use clap::Parser;
use diabetes_risk::form::FORM_RANGES;
use diabetes_risk::service::PredictionReply;
use diabetes_risk::types::{FeatureRecord, FEATURE_NAMES};
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "request-producer", about = "Send synthetic patients to the prediction service")]
struct Args {
    /// NATS server URL
    #[arg(long, default_value = "nats://localhost:4222")]
    nats_url: String,

    /// Request subject the service listens on
    #[arg(long, default_value = "diabetes.predict")]
    subject: String,

    /// Number of requests to send
    #[arg(long, default_value_t = 100)]
    count: u64,

    /// Share of high-risk patients
    #[arg(long, default_value_t = 0.3)]
    high_risk_rate: f64,

    /// Patients per request
    #[arg(long, default_value_t = 1)]
    batch_size: usize,

    /// Delay between requests in milliseconds
    #[arg(long, default_value_t = 100)]
    delay_ms: u64,
}

/// Patient generator for testing
struct PatientGenerator {
    rng: rand::rngs::ThreadRng,
    high_risk_rate: f64,
}

impl PatientGenerator {
    fn new(high_risk_rate: f64) -> Self {
        Self {
            rng: rand::thread_rng(),
            high_risk_rate: high_risk_rate.clamp(0.0, 1.0),
        }
    }

    fn next(&mut self) -> FeatureRecord {
        if self.rng.gen_bool(self.high_risk_rate) {
            self.generate_high_risk()
        } else {
            self.generate_low_risk()
        }
    }

    /// Young patient with normal glucose and BMI
    fn generate_low_risk(&mut self) -> FeatureRecord {
        FeatureRecord {
            pregnancies: self.rng.gen_range(0..3),
            glucose: self.rng.gen_range(70.0..110.0),
            blood_pressure: self.rng.gen_range(60.0..80.0),
            skin_thickness: self.rng.gen_range(10.0..30.0),
            insulin: self.rng.gen_range(0.0..120.0),
            bmi: self.rng.gen_range(19.0..27.0),
            diabetes_pedigree_function: self.rng.gen_range(0.078..0.5),
            age: self.rng.gen_range(21..35),
        }
    }

    /// Older patient with high glucose and BMI
    fn generate_high_risk(&mut self) -> FeatureRecord {
        FeatureRecord {
            pregnancies: self.rng.gen_range(3..12),
            glucose: self.rng.gen_range(150.0..FORM_RANGES[1].max),
            blood_pressure: self.rng.gen_range(70.0..100.0),
            skin_thickness: self.rng.gen_range(25.0..50.0),
            insulin: self.rng.gen_range(100.0..400.0),
            bmi: self.rng.gen_range(32.0..50.0),
            diabetes_pedigree_function: self.rng.gen_range(0.5..FORM_RANGES[6].max),
            age: self.rng.gen_range(40..70),
        }
    }

    fn batch(&mut self, size: usize) -> Vec<FeatureRecord> {
        (0..size.max(1)).map(|_| self.next()).collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("request_producer=info".parse()?),
        )
        .init();

    let args = Args::parse();
    info!(
        nats_url = %args.nats_url,
        subject = %args.subject,
        count = args.count,
        high_risk_rate = args.high_risk_rate,
        batch_size = args.batch_size,
        delay_ms = args.delay_ms,
        "Starting Test Request Producer"
    );

    let client = match async_nats::connect(&args.nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(&args).await;
        }
    };

    let mut generator = PatientGenerator::new(args.high_risk_rate);
    let mut positives = 0u64;
    let mut failed = 0u64;

    for i in 0..args.count {
        let patients = generator.batch(args.batch_size);
        let payload = serde_json::to_vec(&patients)?;

        let message = match client.request(args.subject.clone(), payload.into()).await {
            Ok(m) => m,
            Err(e) => {
                warn!(request = i + 1, error = %e, "Request failed");
                failed += 1;
                continue;
            }
        };

        let reply: PredictionReply = serde_json::from_slice(&message.payload)?;
        if let Some(error) = &reply.error {
            warn!(request_id = %reply.request_id, kind = error.kind.as_str(), "{}", error.message);
            failed += 1;
        }
        for result in &reply.results {
            if result.class == Some(1) {
                positives += 1;
            }
            info!(
                request_id = %reply.request_id,
                row = result.row,
                label = result.label.as_deref().unwrap_or("-"),
                p_diabetes = result.probabilities.map(|p| p[1]).unwrap_or(f64::NAN),
                "Prediction received"
            );
        }

        tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;
    }

    info!(
        "Completed! Sent {} requests ({} positive predictions, {} failed)",
        args.count, positives, failed
    );

    Ok(())
}

/// Print the generated patients as CSV instead of sending them
async fn run_dry_mode(args: &Args) -> Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = PatientGenerator::new(args.high_risk_rate);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(std::io::stdout().lock());
    writer.write_record(FEATURE_NAMES)?;

    for _ in 0..args.count {
        for patient in generator.batch(args.batch_size) {
            writer.serialize(patient)?;
        }
    }
    writer.flush()?;

    Ok(())
}
