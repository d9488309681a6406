//! mrs-upload - MRS/DICOM upload client
//!
//! Selects `.dcm` data from local folders, groups it into per-subject
//! batches, and submits it to the MRS processing service. Optionally chains
//! the IDH and 1p/19q classifiers on the processing results.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mrs_common::config::{self as common_config, MergePolicy, TomlConfig};
use mrs_common::{EventBus, MrsEvent, UploadRole};
use mrs_upload::config::{CliOverrides, ClientSettings};
use mrs_upload::models::{ProcessingMode, ProcessingResponse, RoleSelections, SelectedFile};
use mrs_upload::services::classifier_upload::prediction_files;
use mrs_upload::services::{
    ClassifierUpload, FolderPicker, OptionState, PipelineClient, QueuedFolderPicker,
    UnsupportedFolderPicker, UploadAssembler,
};
use mrs_upload::{SelectionError, UploadSession};

/// Command-line arguments for mrs-upload
#[derive(Parser, Debug)]
#[command(name = "mrs-upload")]
#[command(about = "Upload MRS DICOM data to the processing and classifier service")]
#[command(version)]
#[command(long_version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("MRS_GIT_HASH"),
    ", ",
    env!("MRS_BUILD_PROFILE"),
    ")"
))]
struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true, env = "MRS_CONFIG")]
    config: Option<PathBuf>,

    /// Service base URL (also MRS_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true, env = "MRS_REQUEST_TIMEOUT_SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Select data and run the processing pipeline
    Process(ProcessArgs),
    /// Run the classifier on local LCModel .COORD/.PRINT outputs
    Classify(ClassifyArgs),
    /// Write a config file with default values
    InitConfig {
        /// Target path (default: platform config dir)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Processing mode
    #[arg(long, value_enum)]
    mode: ProcessingMode,

    /// MULTI mode: subject folders (one batch per folder)
    #[arg(long = "folder")]
    folders: Vec<PathBuf>,

    /// MONO mode: primary-signal .dcm files or folders
    #[arg(long = "fid")]
    fid: Vec<PathBuf>,

    /// MONO mode: water-reference .dcm files or folders
    #[arg(long = "water")]
    water: Vec<PathBuf>,

    /// Treat folders as a directory file input (group by sub-folder)
    #[arg(long)]
    flat: bool,

    /// Acquisition type sent as `datatype`
    #[arg(long, env = "MRS_DATATYPE")]
    datatype: Option<String>,

    /// What a merge does when its folder label already exists
    #[arg(long, value_enum)]
    merge_policy: Option<MergePolicyArg>,

    /// Pick one more folder for the mode's primary role with a dialog
    #[arg(long)]
    native_picker: bool,

    /// Run the classifiers on the processing results
    #[arg(long)]
    classify: bool,

    /// Download PDFs, report and predictions into this directory
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Ask the service to delete the run's working folder afterwards
    #[arg(long)]
    cleanup: bool,
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    /// MEGA_OFF .COORD files
    #[arg(long = "coord-off", required = true)]
    coord_off: Vec<PathBuf>,

    /// MEGA_OFF .PRINT files
    #[arg(long = "print-off", required = true)]
    print_off: Vec<PathBuf>,

    /// MEGA_DIFF .COORD files
    #[arg(long = "coord-diff")]
    coord_diff: Vec<PathBuf>,

    /// MEGA_DIFF .PRINT files
    #[arg(long = "print-diff")]
    print_diff: Vec<PathBuf>,

    /// Also run the 1p/19q codeletion classifier
    #[arg(long)]
    second: bool,

    /// Write prediction CSVs into this directory
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MergePolicyArg {
    Replace,
    Append,
}

impl From<MergePolicyArg> for MergePolicy {
    fn from(arg: MergePolicyArg) -> Self {
        match arg {
            MergePolicyArg::Replace => MergePolicy::Replace,
            MergePolicyArg::Append => MergePolicy::Append,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config is read before logging so its level can seed the filter
    let config_path = common_config::locate_config_file(cli.config.as_deref());
    let loaded = config_path
        .as_deref()
        .map(|p| (p, common_config::load_toml_config(p)));
    let toml_config = match &loaded {
        Some((_, Ok(config))) => config.clone(),
        _ => TomlConfig::default(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("mrs_upload={0},mrs_common={0}", toml_config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("MRS_GIT_HASH"),
        profile = env!("MRS_BUILD_PROFILE"),
        "Starting mrs-upload"
    );
    match &loaded {
        Some((path, Ok(_))) => info!(path = %path.display(), "Loaded configuration"),
        Some((path, Err(e))) => {
            warn!(path = %path.display(), error = %e, "Config file unusable, using compiled defaults")
        }
        None => info!("No config file found, using compiled defaults"),
    }

    match cli.command {
        Command::InitConfig { path, force } => init_config(path, force),
        Command::Process(args) => {
            let overrides = CliOverrides {
                server_url: cli.server.clone(),
                datatype: args.datatype.clone(),
                request_timeout_secs: cli.timeout,
                merge_policy: args.merge_policy.map(Into::into),
            };
            let settings = ClientSettings::resolve(&overrides, &toml_config)
                .context("Invalid configuration")?;
            run_process(args, settings).await
        }
        Command::Classify(args) => {
            let overrides = CliOverrides {
                server_url: cli.server.clone(),
                request_timeout_secs: cli.timeout,
                ..Default::default()
            };
            let settings = ClientSettings::resolve(&overrides, &toml_config)
                .context("Invalid configuration")?;
            run_classify(args, settings).await
        }
    }
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path.or_else(common_config::default_config_path) {
        Some(path) => path,
        None => bail!("No platform config directory; pass --path"),
    };

    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    common_config::write_toml_config(&TomlConfig::default(), &path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn run_process(args: ProcessArgs, settings: ClientSettings) -> Result<()> {
    let event_bus = EventBus::new(100);
    spawn_event_logger(&event_bus);

    let session = UploadSession::with_policy(event_bus.clone(), settings.merge_policy);
    info!(
        session_id = %session.session_id(),
        merge_policy = ?session.merge_policy(),
        mode = %args.mode,
        "Selecting inputs"
    );

    select_inputs(&session, UploadRole::MultiFolder, &args.folders, args.flat).await?;
    select_inputs(&session, UploadRole::MonoFid, &args.fid, args.flat).await?;
    select_inputs(&session, UploadRole::MonoWater, &args.water, args.flat).await?;

    if args.native_picker {
        let role = match args.mode {
            ProcessingMode::Multi => UploadRole::MultiFolder,
            ProcessingMode::Mono => UploadRole::MonoFid,
        };
        let picker = native_picker();
        match session.add_folder(role, picker.as_ref()).await {
            Ok(label) => info!(role = %role, label = %label, "Folder added from dialog"),
            Err(SelectionError::Cancelled) => info!("Folder dialog dismissed"),
            Err(SelectionError::UnsupportedOperation) => {
                warn!("No folder dialog in this build; pass folders as arguments instead")
            }
            Err(e) => return Err(e).context("Folder selection failed"),
        }
    }

    for role in UploadRole::ALL {
        let summary = session.summary(role).await;
        if !summary.is_empty() {
            println!("[{}]\n{}", role, summary);
        }
    }

    let fallback = RoleSelections::default();
    let readiness = session
        .submit_readiness(
            Some(args.mode),
            OptionState::Selected,
            OptionState::NotOffered,
            &fallback,
        )
        .await;
    if !readiness.enabled {
        for hint in &readiness.hints {
            eprintln!("{}", hint);
        }
        bail!("Nothing to submit in {} mode", args.mode);
    }

    let plan = UploadAssembler::new(settings.datatype.clone()).assemble(
        Some(args.mode),
        &session.snapshot().await,
        &fallback,
    )?;

    let client = PipelineClient::new(settings.server_url.clone(), settings.request_timeout)
        .context("Failed to create HTTP client")?
        .with_event_bus(event_bus);

    let response = client
        .run_processing(plan)
        .await
        .context("Processing request failed")?;
    report_processing(&response);

    let user_folder = response.user_folder();

    if let Some(out_dir) = &args.out_dir {
        download_outputs(&client, &response, out_dir).await?;
    }

    if args.classify {
        if response.lcmodel_files.is_empty() {
            warn!("Processing returned no LCModel outputs; skipping classification");
        } else {
            let upload = ClassifierUpload::from_server_paths(&response.lcmodel_files, user_folder.clone())
                .context("Processing outputs unusable for classification")?;
            classify(&client, upload, true, args.out_dir.as_deref()).await?;
        }
    }

    if args.cleanup {
        if let Some(folder) = &user_folder {
            if let Err(e) = client.cleanup(folder).await {
                warn!(error = %e, "Cleanup failed");
            }
        }
    }

    Ok(())
}

async fn run_classify(args: ClassifyArgs, settings: ClientSettings) -> Result<()> {
    let event_bus = EventBus::new(16);
    spawn_event_logger(&event_bus);

    let upload = ClassifierUpload::from_files(
        files_by_name(&args.coord_off)?,
        files_by_name(&args.print_off)?,
        files_by_name(&args.coord_diff)?,
        files_by_name(&args.print_diff)?,
    )?;

    let client = PipelineClient::new(settings.server_url, settings.request_timeout)
        .context("Failed to create HTTP client")?
        .with_event_bus(event_bus);

    classify(&client, upload, args.second, args.out_dir.as_deref()).await
}

/// Add CLI paths to a role: folders become batches, files a flat merge
async fn select_inputs(
    session: &UploadSession,
    role: UploadRole,
    paths: &[PathBuf],
    flat: bool,
) -> Result<()> {
    let mut folders = Vec::new();
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            if flat {
                session
                    .merge_directory(role, path.clone())
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
            } else {
                folders.push(path.clone());
            }
        } else if path.is_file() {
            files.push(SelectedFile::from_disk(file_name_of(path), path));
        } else {
            bail!("No such file or folder: {}", path.display());
        }
    }

    let picker = QueuedFolderPicker::new(folders);
    while picker.remaining() > 0 {
        session
            .add_folder(role, &picker)
            .await
            .context("Failed to add folder")?;
    }

    if !files.is_empty() {
        session.merge_files(role, files).await;
    }
    Ok(())
}

async fn classify(
    client: &PipelineClient,
    upload: ClassifierUpload,
    run_second: bool,
    out_dir: Option<&Path>,
) -> Result<()> {
    let uses_mega_diff = upload.uses_mega_diff();

    let response = client
        .run_classifier(upload)
        .await
        .context("Classifier request failed")?;
    if let Some(output) = &response.output {
        println!("{}", output.trim_end());
    }

    let Some(user_folder) = response.user_folder() else {
        warn!("Classifier response carried no user folder; predictions unavailable");
        return Ok(());
    };

    let [idh_csv, codeletion_csv] = prediction_files(uses_mega_diff);
    save_prediction(client, &user_folder, idh_csv, out_dir).await?;

    if run_second {
        match client.run_second_classifier(&user_folder).await {
            Ok(second) => {
                if let Some(message) = &second.message {
                    println!("{}", message);
                }
                let csv = second.predictions_csv.as_deref().unwrap_or(codeletion_csv);
                save_prediction(client, &user_folder, csv, out_dir).await?;
            }
            Err(e) => warn!(error = %e, "1p/19q classifier failed"),
        }
    }

    Ok(())
}

async fn save_prediction(
    client: &PipelineClient,
    user_folder: &str,
    file: &str,
    out_dir: Option<&Path>,
) -> Result<()> {
    let csv = match client.fetch_prediction_csv(user_folder, file).await {
        Ok(csv) => csv,
        Err(e) => {
            warn!(file, error = %e, "Prediction file unavailable");
            return Ok(());
        }
    };

    match out_dir {
        Some(dir) => {
            let target = dir.join(file_name_of(Path::new(file)));
            write_output(&target, csv.as_bytes()).await?;
            println!("Saved {}", target.display());
        }
        None => println!("{}", csv.trim_end()),
    }
    Ok(())
}

fn report_processing(response: &ProcessingResponse) {
    if let Some(folder) = response.user_folder() {
        println!("User folder: {}", folder);
    }
    if let Some(message) = &response.message {
        println!("{}", message);
    }

    let groups = response.pdf_groups();
    if let Some(pdf) = &groups.mega_diff {
        println!("MEGA_DIFF: {}", pdf);
    }
    if let Some(pdf) = &groups.mega_off {
        println!("MEGA_OFF: {}", pdf);
    }
    for pdf in &groups.other {
        println!("PDF: {}", pdf);
    }
    if let Some(report) = response.report_file_name() {
        println!("Report: {}", report);
    }
}

async fn download_outputs(
    client: &PipelineClient,
    response: &ProcessingResponse,
    out_dir: &Path,
) -> Result<()> {
    for pdf in response.pdf_paths() {
        let Some(target) = output_path(out_dir, pdf) else {
            warn!(path = pdf, "Skipping PDF outside the output directory");
            continue;
        };
        let bytes = client
            .fetch_resource(&format!("/pdfs/{}", pdf))
            .await
            .with_context(|| format!("Failed to download {}", pdf))?;
        write_output(&target, &bytes).await?;
    }

    if let Some(report) = response.report_file_name() {
        match output_path(out_dir, report) {
            Some(target) => {
                let bytes = client
                    .fetch_resource(&format!("/report/{}", report))
                    .await
                    .with_context(|| format!("Failed to download {}", report))?;
                write_output(&target, &bytes).await?;
            }
            None => warn!(path = report, "Skipping report outside the output directory"),
        }
    }

    if let Some(user_folder) = response.user_folder() {
        download_plots(client, &user_folder, &out_dir.join("plots")).await?;
    }

    info!(out_dir = %out_dir.display(), "Downloaded outputs");
    Ok(())
}

/// Analysis and SD plots; a missing plot set is logged, not fatal
async fn download_plots(client: &PipelineClient, user_folder: &str, plot_dir: &Path) -> Result<()> {
    let mut urls = Vec::new();
    match client.analysis_plots(user_folder).await {
        Ok(analysis) => urls.extend(analysis.plots.all().into_iter().map(str::to_string)),
        Err(e) => warn!(error = %e, "Analysis plots unavailable"),
    }
    match client.list_sd_plots(user_folder).await {
        Ok(sd_plots) => urls.extend(sd_plots),
        Err(e) => warn!(error = %e, "SD plots unavailable"),
    }

    for url in &urls {
        let name = url.rsplit('/').next().unwrap_or_default();
        let Some(target) = output_path(plot_dir, name) else {
            warn!(url = %url, "Skipping plot with unusable name");
            continue;
        };
        let bytes = client
            .fetch_resource(url)
            .await
            .with_context(|| format!("Failed to download {}", url))?;
        write_output(&target, &bytes).await?;
    }
    Ok(())
}

/// `out_dir` joined with a server-supplied relative path
///
/// Only plain path segments are accepted, so the result stays under `out_dir`.
fn output_path(out_dir: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    let plain = relative.components().next().is_some()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    plain.then(|| out_dir.join(relative))
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn files_by_name(paths: &[PathBuf]) -> Result<Vec<SelectedFile>> {
    paths
        .iter()
        .map(|path| {
            if !path.is_file() {
                bail!("No such file: {}", path.display());
            }
            Ok(SelectedFile::from_disk(file_name_of(path), path))
        })
        .collect()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(feature = "native-dialog")]
fn native_picker() -> Box<dyn FolderPicker> {
    Box::new(mrs_upload::services::NativeFolderPicker::new("Select MRS data folder"))
}

#[cfg(not(feature = "native-dialog"))]
fn native_picker() -> Box<dyn FolderPicker> {
    Box::new(UnsupportedFolderPicker)
}

/// Log selection and upload events as they are published
fn spawn_event_logger(event_bus: &EventBus) {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(MrsEvent::SelectionChanged {
                    role,
                    batch_count,
                    total_files,
                    ..
                }) => info!(role = %role, batches = batch_count, files = total_files, "Selection changed"),
                Ok(MrsEvent::SelectionReset { .. }) => info!("Selection reset"),
                Ok(MrsEvent::UploadStarted {
                    endpoint,
                    file_count,
                    ..
                }) => info!(endpoint = %endpoint, files = file_count, "Upload started"),
                Ok(MrsEvent::UploadCompleted {
                    endpoint,
                    user_folder,
                    ..
                }) => info!(endpoint = %endpoint, user_folder = ?user_folder, "Upload completed"),
                Ok(MrsEvent::UploadFailed {
                    endpoint, message, ..
                }) => warn!(endpoint = %endpoint, error = %message, "Upload failed"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagged")
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_keeps_server_files_inside_out_dir() {
        let out_dir = Path::new("/home/user/results");

        assert_eq!(
            output_path(out_dir, "mega_off/S14.pdf"),
            Some(PathBuf::from("/home/user/results/mega_off/S14.pdf"))
        );
        assert_eq!(output_path(out_dir, "/tmp/evil.pdf"), None);
        assert_eq!(output_path(out_dir, "../../outside.pdf"), None);
        assert_eq!(output_path(out_dir, "mega_off/../../outside.pdf"), None);
        assert_eq!(output_path(out_dir, "./S14.pdf"), None);
        assert_eq!(output_path(out_dir, ""), None);
    }
}
