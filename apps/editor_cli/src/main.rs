use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{HttpModelService, LogUpload, SessionStore};
use editor_core::{report, EditorSession};
use shared::{
    domain::NodeId,
    protocol::{CutDirection, DistillParams, FineTuneParams, ModelToUse, TrainParams},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod repl;

use config::load_settings;

#[derive(Parser, Debug)]
#[command(name = "distill-editor", version, about = "Inspect and edit distilled decision trees")]
struct Cli {
    /// TOML settings file; defaults to ./editor.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Overrides the configured model service url.
    #[arg(long, global = true)]
    service_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Session id, service and current stage.
    Status,
    /// Print the current tree.
    Show {
        /// Emit the laid-out diagram as JSON instead of an outline.
        #[arg(long)]
        json: bool,
    },
    /// Upload an XES event log.
    Upload { file: PathBuf },
    Train(TrainArgs),
    Distill(DistillArgs),
    /// Collapse a split node into a leaf.
    Cut {
        node: i64,
        #[arg(long, value_enum, default_value_t = DirectionArg::Auto)]
        direction: DirectionArg,
    },
    /// Refit the subtree below a split node.
    Retrain { node: i64 },
    /// Fine-tune the network against the edited tree.
    Finetune(FineTuneArgs),
    /// Keep the fine-tuned network and distill a tree from it.
    Confirm(DistillArgs),
    /// Discard the fine-tuned network and distill from the original.
    Revert(DistillArgs),
    /// Interactive editing loop on stdin.
    Edit,
    /// Forget the stored session id and start a new server-side session.
    ResetSession,
}

#[derive(clap::Args, Debug)]
struct TrainArgs {
    #[arg(long)]
    prefix_length: Option<u32>,
    #[arg(long = "cat-attribute")]
    cat_attributes: Vec<String>,
    #[arg(long = "num-attribute")]
    num_attributes: Vec<String>,
    #[arg(long = "sensitive-attribute")]
    sensitive_attributes: Vec<String>,
    #[arg(long)]
    test_split: Option<f64>,
    #[arg(long)]
    epochs: Option<u32>,
    #[arg(long)]
    learning_rate: Option<f64>,
    #[arg(long, value_delimiter = ',')]
    hidden_units: Vec<u32>,
}

impl TrainArgs {
    fn into_params(self) -> TrainParams {
        let defaults = TrainParams::default();
        TrainParams {
            prefix_length: self.prefix_length.unwrap_or(defaults.prefix_length),
            cat_attributes: non_empty_or(self.cat_attributes, defaults.cat_attributes),
            num_attributes: non_empty_or(self.num_attributes, defaults.num_attributes),
            sensitive_attributes: non_empty_or(
                self.sensitive_attributes,
                defaults.sensitive_attributes,
            ),
            test_split: self.test_split.unwrap_or(defaults.test_split),
            epochs: self.epochs.unwrap_or(defaults.epochs),
            learning_rate: self.learning_rate.unwrap_or(defaults.learning_rate),
            hidden_units: non_empty_or(self.hidden_units, defaults.hidden_units),
        }
    }
}

fn non_empty_or<T>(given: Vec<T>, fallback: Vec<T>) -> Vec<T> {
    if given.is_empty() {
        fallback
    } else {
        given
    }
}

#[derive(clap::Args, Debug, Default)]
pub(crate) struct DistillArgs {
    #[arg(long)]
    min_samples_split: Option<u32>,
    #[arg(long)]
    max_depth: Option<u32>,
    #[arg(long)]
    ccp_alpha: Option<f64>,
    /// Network to distill from (plain `distill` only).
    #[arg(long, value_enum)]
    model: Option<ModelArg>,
}

impl DistillArgs {
    pub(crate) fn into_params(self) -> DistillParams {
        let defaults = DistillParams::default();
        DistillParams {
            min_samples_split: self.min_samples_split.unwrap_or(defaults.min_samples_split),
            max_depth: self.max_depth.unwrap_or(defaults.max_depth),
            ccp_alpha: self.ccp_alpha.unwrap_or(defaults.ccp_alpha),
            model_to_use: self.model.map(Into::into).unwrap_or(defaults.model_to_use),
        }
    }
}

#[derive(clap::Args, Debug, Default)]
pub(crate) struct FineTuneArgs {
    #[arg(long)]
    learning_rate: Option<f64>,
    #[arg(long)]
    epochs: Option<u32>,
    #[arg(long)]
    batch_size: Option<u32>,
}

impl FineTuneArgs {
    pub(crate) fn into_params(self) -> FineTuneParams {
        let defaults = FineTuneParams::default();
        FineTuneParams {
            learning_rate: self.learning_rate.unwrap_or(defaults.learning_rate),
            epoch: self.epochs.unwrap_or(defaults.epoch),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            ..defaults
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum DirectionArg {
    Auto,
    Left,
    Right,
}

impl From<DirectionArg> for CutDirection {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Auto => CutDirection::Auto,
            DirectionArg::Left => CutDirection::Left,
            DirectionArg::Right => CutDirection::Right,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ModelArg {
    Original,
    Latest,
}

impl From<ModelArg> for ModelToUse {
    fn from(value: ModelArg) -> Self {
        match value {
            ModelArg::Original => ModelToUse::Original,
            ModelArg::Latest => ModelToUse::Latest,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(url) = cli.service_url {
        settings.service_url = url;
        settings.validate()?;
    }

    let store = SessionStore::in_data_dir(settings.data_dir.as_deref())?;
    if let Command::ResetSession = cli.command {
        let record = store.reset()?;
        println!("new session {}", record.session_id);
        return Ok(());
    }
    let record = store.load_or_create()?;

    let service = HttpModelService::with_timeout(
        &settings.service_url,
        Duration::from_secs(settings.request_timeout_secs),
    )?;
    info!(
        session_id = %record.session_id,
        service_url = %service.base_url(),
        "opening session"
    );
    let session = EditorSession::open(
        Arc::new(service),
        record.session_id.clone(),
        settings.layout(),
    )
    .await
    .context("failed to open session")?;

    match cli.command {
        Command::Status => {
            let stages = session.stages().await;
            println!("session   {}", record.session_id);
            println!("created   {}", record.created_at.to_rfc3339());
            println!("service   {}", settings.service_url);
            println!("stage     {}", stages.current());
            match session.controller().tree().await {
                Some(tree) => println!(
                    "tree      {} nodes, max depth {}",
                    tree.node_count(),
                    tree.max_depth()
                ),
                None => println!("tree      none"),
            }
        }
        Command::Show { json } => {
            if json {
                let diagram = session.controller().diagram().await?;
                println!("{}", serde_json::to_string_pretty(&diagram)?);
            } else {
                print_outline(&session).await?;
            }
        }
        Command::Upload { file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read event log '{}'", file.display()))?;
            let filename = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "log.xes".to_string());
            let summary = session.upload(LogUpload { filename, bytes }).await?;
            print!("{}", report::upload_table(&summary));
        }
        Command::Train(args) => {
            let result = session.train(&args.into_params()).await?;
            print!("{}", report::metrics_table(&report::train_rows(&result)));
        }
        Command::Distill(args) => {
            let result = session.distill(&args.into_params()).await?;
            print!("{}", report::metrics_table(&report::distill_rows(&result)));
            print_outline(&session).await?;
        }
        Command::Cut { node, direction } => {
            select_split(&session, NodeId(node)).await?;
            let result = session.controller().cut(direction.into()).await?;
            print!("{}", report::metrics_table(&report::modify_rows(&result)));
            print_outline(&session).await?;
        }
        Command::Retrain { node } => {
            select_split(&session, NodeId(node)).await?;
            let result = session.controller().retrain().await?;
            print!("{}", report::metrics_table(&report::modify_rows(&result)));
            print_outline(&session).await?;
        }
        Command::Finetune(args) => {
            let result = session.controller().fine_tune(&args.into_params()).await?;
            print!("{}", report::metrics_table(&report::fine_tune_rows(&result)));
            println!("run `confirm` to keep the fine-tuned network or `revert` to discard it");
        }
        // A fresh process has no pending fine-tune in memory, so the decision
        // is expressed as a distill from the matching network.
        Command::Confirm(args) => {
            let params = args.into_params().with_model(ModelToUse::Latest);
            let result = session.distill(&params).await?;
            print!("{}", report::metrics_table(&report::distill_rows(&result)));
        }
        Command::Revert(args) => {
            let params = args.into_params().with_model(ModelToUse::Original);
            let result = session.distill(&params).await?;
            print!("{}", report::metrics_table(&report::distill_rows(&result)));
        }
        Command::Edit => repl::run(&session).await?,
        // Handled before the session is opened.
        Command::ResetSession => {}
    }

    Ok(())
}

pub(crate) async fn print_outline(session: &EditorSession) -> Result<()> {
    let controller = session.controller();
    match controller.tree().await {
        Some(tree) => print!(
            "{}",
            report::outline(&tree, controller.selection().await)?
        ),
        None => println!("no tree yet; upload, train and distill first"),
    }
    Ok(())
}

pub(crate) async fn select_split(session: &EditorSession, node_id: NodeId) -> Result<()> {
    let controller = session.controller();
    let Some(tree) = controller.tree().await else {
        bail!("no tree loaded; distill one first");
    };
    match tree.find(node_id) {
        None => bail!("node {node_id} is not part of the current tree"),
        Some(node) if node.is_leaf() => bail!("node {node_id} is a leaf; pick a split node"),
        Some(_) => {
            controller.select(node_id).await;
            Ok(())
        }
    }
}
