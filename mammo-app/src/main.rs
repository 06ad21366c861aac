//! MammoScan工作流主程序
//!
//! 演示完整的分析工作流：拉取名册与统计、填写患者信息、
//! 导入影像、运行分析并保存到患者记录。

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use mammo_analyzer::Analyzer;
use mammo_client::{AssetResolver, HttpPatientApi, PatientApi};
use mammo_core::config::AppConfig;
use mammo_core::events::EventBus;
use mammo_core::Result;
use mammo_roster::{DetailLoader, RosterManager};
use tracing::{error, info, warn};

/// MammoScan命令行参数
#[derive(Parser, Debug)]
#[command(name = "mammo-app")]
#[command(about = "MammoScan 乳腺影像分析工作流")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 后端API地址（覆盖配置文件）
    #[arg(long)]
    api_base: Option<String>,

    /// 患者ID（留空由服务端分配）
    #[arg(long)]
    patient_id: Option<String>,

    /// 患者姓名
    #[arg(long, default_value = "Jane Doe")]
    name: String,

    /// 患者年龄
    #[arg(long, default_value = "45")]
    age: u32,

    /// 扫描日期
    #[arg(long, default_value = "2026-08-30")]
    scan_date: String,

    /// 待分析的影像文件
    #[arg(short, long)]
    image: Vec<PathBuf>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    info!("Starting MammoScan workflow...");

    // 加载配置
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(base) = args.api_base {
        config.api.base_url = base;
    }
    info!("Backend API: {}", config.api.base_url);

    // 组装共享组件
    let api: Arc<dyn PatientApi> = Arc::new(HttpPatientApi::new(&config.api)?);
    let bus = EventBus::default();
    let resolver = AssetResolver::from_config(&config);

    // 名册：拉取列表并订阅保存事件
    let roster = RosterManager::new(api.clone(), DetailLoader::new(api.clone(), resolver));
    let listener = roster.spawn_refresh_listener(&bus);
    roster.refresh().await?;
    {
        let state = roster.state();
        let state = state.lock().await;
        info!("Roster loaded, {} patients", state.records().len());
    }

    // 仪表盘统计
    match api.get_stats().await {
        Ok(stats) => {
            for card in &stats {
                info!("  {}: {} ({})", card.title, card.value, card.change);
            }
        }
        Err(e) => warn!("Stats unavailable: {}", e),
    }

    // 最近的分析记录
    match api.get_recent_analyses().await {
        Ok(recent) => {
            for entry in recent.iter().take(5) {
                info!(
                    "  #{} {}: {} ({}%)",
                    entry.id,
                    entry.date.date_naive(),
                    entry.result,
                    entry.confidence
                );
            }
        }
        Err(e) => warn!("Recent analyses unavailable: {}", e),
    }

    // 分析器会话
    let mut analyzer = Analyzer::new(config.analyzer.clone(), api.clone(), bus);
    {
        let state = analyzer.state();
        let mut session = state.lock().await;
        session.set_patient_id(args.patient_id);
        session.set_name(&args.name);
        session.set_age(args.age);
        session.set_scan_date(&args.scan_date);
    }

    if args.image.is_empty() {
        info!("No images given, skipping analysis run");
        listener.abort();
        return Ok(());
    }

    // 导入影像并运行模拟分析
    analyzer.upload_images(args.image).await?;
    analyzer.start_analysis().await?;
    analyzer.wait_for_analysis().await;

    {
        let state = analyzer.state();
        let session = state.lock().await;
        if let Some(analysis) = session.analysis() {
            info!(
                "Analysis complete: {} ({}% confidence, {})",
                analysis.overall, analysis.confidence, analysis.birads
            );
        }
    }

    // 保存到患者记录
    match analyzer.save().await {
        Ok(Some(outcome)) => {
            info!("{}", outcome.message);
            if let Some(id) = outcome.assigned_id {
                info!("Patient id: {}", id);
            }
        }
        Ok(None) => warn!("Save already in flight"),
        Err(e) => {
            error!("Save failed: {}", e);
            listener.abort();
            return Err(e);
        }
    }

    // 保存事件会触发名册刷新，给监听任务一点时间
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    {
        let state = roster.state();
        let state = state.lock().await;
        info!("Roster now has {} patients", state.records().len());
    }

    listener.abort();
    Ok(())
}
