// ==========================================
// Excel 汇总工具 - 命令行入口
// ==========================================
// 职责: 解析参数 → 加载配置 → 执行汇总 → 输出结果路径
// 进度条与日志写 stderr; 结果文件绝对路径写 stdout
// ==========================================

use anyhow::{Context, Result};
use clap::Parser;
use excel_aggregator::config::AggregatorConfig;
use excel_aggregator::engine::{
    percent, AggregationOrchestrator, EngineError, NoOpProgress, ProgressSink,
};
use excel_aggregator::logging::{self, LogFormat};
use excel_aggregator::AggregationReport;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 中断退出码（128 + SIGINT）
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "excel-aggregator")]
#[command(version, about = "按控制表从源 Excel 文件抽取单元格并生成结果工作簿")]
struct Args {
    /// 工作目录（控制文件所在目录，默认: 可执行文件所在目录）
    work_dir: Option<PathBuf>,

    /// 配置文件路径（默认按查找顺序加载）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 结果文件输出目录（覆盖配置）
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// 以 JSON 格式输出日志
    #[arg(long)]
    log_json: bool,

    /// 不显示进度条
    #[arg(short, long)]
    quiet: bool,
}

// ==========================================
// ConsoleProgress - 终端进度条
// ==========================================
struct ConsoleProgress {
    last_permille: Option<u32>,
}

impl ConsoleProgress {
    const WIDTH: usize = 30;

    fn new() -> Self {
        Self { last_permille: None }
    }

    fn finish(&self) {
        if self.last_permille.is_some() {
            eprintln!();
        }
    }
}

impl ProgressSink for ConsoleProgress {
    fn report(&mut self, processed: usize, total: usize) {
        let pct = percent(processed, total);
        let permille = (pct * 10.0).round() as u32;
        if self.last_permille == Some(permille) {
            return;
        }
        self.last_permille = Some(permille);

        let filled = ((pct / 100.0) * Self::WIDTH as f64).round() as usize;
        let filled = filled.min(Self::WIDTH);
        let mut stderr = std::io::stderr().lock();
        let _ = write!(
            stderr,
            "\r[{}{}] {}/{}  {:5.1}%",
            "#".repeat(filled),
            "-".repeat(Self::WIDTH - filled),
            processed,
            total,
            pct
        );
        let _ = stderr.flush();
    }
}

fn default_work_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("无法获取可执行文件路径")?;
    match exe.parent() {
        Some(dir) => Ok(dir.to_path_buf()),
        None => std::env::current_dir().context("无法获取当前目录"),
    }
}

fn load_config(args: &Args, work_dir: &Path) -> Result<AggregatorConfig> {
    let mut config = match &args.config {
        Some(path) => AggregatorConfig::from_file(path)
            .with_context(|| format!("配置文件加载失败: {}", path.display()))?,
        None => AggregatorConfig::load(work_dir).context("配置加载失败")?,
    };
    if let Some(dir) = &args.output_dir {
        config.output.directory = Some(dir.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.log_json {
        logging::init_with_format(LogFormat::Json);
    } else {
        logging::init();
    }

    tracing::info!("==================================================");
    tracing::info!("{} v{}", excel_aggregator::APP_NAME, excel_aggregator::VERSION);
    tracing::info!("==================================================");

    match run(args).await {
        Ok(report) => {
            println!("{}", report.output_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            let interrupted = matches!(e.downcast_ref::<EngineError>(), Some(EngineError::Interrupted));
            eprintln!("错误: {:#}", e);
            if interrupted {
                ExitCode::from(EXIT_INTERRUPTED)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(args: Args) -> Result<AggregationReport> {
    let work_dir = match &args.work_dir {
        Some(dir) => dir.clone(),
        None => default_work_dir()?,
    };
    let config = load_config(&args, &work_dir)?;
    tracing::info!(work_dir = %work_dir.display(), "工作目录");

    // Ctrl-C 只置位中断标志,由引擎在行与行之间检查
    let cancel = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("收到 Ctrl-C，正在停止");
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    let quiet = args.quiet;
    let report = tokio::task::spawn_blocking(move || {
        let orchestrator = AggregationOrchestrator::new(config);
        if quiet {
            return orchestrator.run(&work_dir, &mut NoOpProgress, &cancel);
        }
        let mut progress = ConsoleProgress::new();
        let result = orchestrator.run(&work_dir, &mut progress, &cancel);
        progress.finish();
        result
    })
    .await
    .context("汇总任务异常终止")??;

    Ok(report)
}
