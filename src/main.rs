//! Diabetes Risk - Main Entry Point
//!
//! Loads the model artifacts once, then scores a CSV table (`batch`), a single
//! form entry (`predict`), or answers prediction requests over NATS (`serve`).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use diabetes_risk::{
    config::{AppConfig, LoggingConfig},
    consumer::RequestConsumer,
    error::PipelineError,
    feature_extractor::FeatureExtractor,
    form::FormInput,
    metrics::{MetricsReporter, PipelineMetrics},
    models::{ArtifactLoader, BatchPolicy, InferenceEngine},
    producer::ReplyProducer,
    report::{self, RenderOptions},
    service::{RequestHandler, WorkerPool},
    types::Locale,
};
use futures::StreamExt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "diabetes-risk",
    version,
    about = "Diabetes risk prediction from eight clinical features"
)]
struct Cli {
    /// Configuration file (defaults to config/config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Label language, overriding the configuration
    #[arg(long, global = true, value_enum)]
    locale: Option<Locale>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score every row of a CSV file and write it back with a prediction column
    Batch {
        /// CSV file with a header row
        input: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Row error policy, overriding the configuration
        #[arg(long, value_enum)]
        policy: Option<BatchPolicy>,

        /// Append per-class probability columns
        #[arg(long)]
        with_probabilities: bool,
    },

    /// Score one patient entered field by field
    Predict(FormInput),

    /// Answer prediction requests over NATS
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    if let Some(locale) = cli.locale {
        config.output.locale = locale;
    }

    init_logging(&config.logging)?;

    // Artifacts must be in place before any input is accepted
    let artifacts = match ArtifactLoader::load(&config.artifacts) {
        Ok(artifacts) => Arc::new(artifacts),
        Err(e) => {
            error!(error = %e, "Model artifacts unavailable, refusing to start");
            return Err(e).context("Cannot start without the model and scaler artifacts");
        }
    };
    let engine = InferenceEngine::new(artifacts);

    match cli.command {
        Command::Batch {
            input,
            output,
            policy,
            with_probabilities,
        } => {
            let options = RenderOptions {
                locale: config.output.locale,
                with_probabilities: with_probabilities || config.output.with_probabilities,
            };
            let policy = policy.unwrap_or(config.output.batch_policy);
            run_batch(&engine, input, output, policy, options)
        }
        Command::Predict(form) => run_predict(&engine, &form, config.output.locale),
        Command::Serve => run_service(engine, &config).await,
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("diabetes_risk={}", logging.level).parse()?);

    // Logs go to stderr so table output on stdout stays clean
    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }

    Ok(())
}

fn run_batch(
    engine: &InferenceEngine,
    input: PathBuf,
    output: Option<PathBuf>,
    policy: BatchPolicy,
    options: RenderOptions,
) -> Result<()> {
    let start_time = Instant::now();
    let metrics = PipelineMetrics::new();

    let file = File::open(&input)
        .with_context(|| format!("Failed to open input file {}", input.display()))?;

    let table = match FeatureExtractor::new().from_reader(BufReader::new(file)) {
        Ok(table) => table,
        Err(PipelineError::SchemaMismatch { missing }) => {
            let message = report::schema_mismatch_message(&missing, options.locale);
            warn!(missing = ?missing, "Uploaded table is missing required columns");
            bail!(message);
        }
        Err(e) => return Err(e).context("Failed to read uploaded table"),
    };

    info!(
        path = %input.display(),
        rows = table.len(),
        columns = table.headers.len(),
        "Uploaded data loaded"
    );

    let scored = engine.predict_table(table, policy)?;

    for (_, prediction) in scored.predictions() {
        metrics.record_prediction(prediction);
    }
    for (_, e) in scored.failures() {
        metrics.record_failure(e.kind());
    }

    match &output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            report::write_table(&scored, options, BufWriter::new(file))?;
        }
        None => report::write_table(&scored, options, io::stdout().lock())?,
    }

    metrics.record_request(start_time.elapsed());

    let failed = scored.failure_count();
    if failed > 0 {
        for (row, e) in scored.failures() {
            eprintln!("row {}: {}", row, e);
        }
        warn!(
            scored = scored.rows.len() - failed,
            failed,
            "Prediction finished with unscored rows"
        );
    } else {
        info!(scored = scored.rows.len(), "Prediction succeeded");
    }
    metrics.print_summary();

    Ok(())
}

fn run_predict(engine: &InferenceEngine, form: &FormInput, locale: Locale) -> Result<()> {
    let capture = form.capture();
    for field in &capture.clamped {
        eprintln!(
            "{} adjusted from {} to {}",
            field.name, field.entered, field.used
        );
    }

    let record = FeatureExtractor::new().from_form(&capture);
    let prediction = engine.predict(&record)?;

    info!(
        class = ?prediction.class,
        p_diabetes = prediction.diabetes_probability(),
        "Form prediction complete"
    );
    println!("{}", report::form_summary(&prediction, locale));

    Ok(())
}

async fn run_service(engine: InferenceEngine, config: &AppConfig) -> Result<()> {
    let metrics = Arc::new(PipelineMetrics::new());
    let handler = Arc::new(RequestHandler::new(
        engine,
        config.output.locale,
        config.output.batch_policy,
        metrics.clone(),
    ));

    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(client.clone(), &config.nats);
    let producer = ReplyProducer::new(client.clone());

    let num_workers = config.service.workers.max(1);
    info!(
        workers = num_workers,
        subject = %consumer.subject(),
        "Starting prediction service"
    );

    let mut workers = WorkerPool::new(num_workers);

    let reporter = MetricsReporter::new(metrics.clone(), config.service.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let handler = handler.clone();
        let producer = producer.clone();

        workers
            .spawn(async move {
                let reply = handler.handle(&message.payload);

                match message.reply {
                    Some(subject) => {
                        if let Err(e) = producer.publish(subject.to_string(), &reply).await {
                            error!(
                                request_id = %reply.request_id,
                                error = %e,
                                "Failed to publish prediction reply"
                            );
                        }
                    }
                    None => warn!(
                        request_id = %reply.request_id,
                        "Request has no reply subject, result dropped"
                    ),
                }
            })
            .await?;
    }

    info!(in_flight = workers.in_flight(), "Subscription closed, draining requests");
    workers.shutdown().await;

    info!("Prediction service shutting down...");
    metrics.print_summary();

    Ok(())
}
