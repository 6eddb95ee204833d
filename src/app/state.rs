// ==========================================
// 主生产计划引擎 - 应用状态
// ==========================================
// 单连接: SQLite 写入本身串行, 并发冲突由修订号检测
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{ConfigApi, ScheduleApi};
use crate::config::ConfigManager;
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::repository::{ActionLogRepository, ScheduleRepository};

/// CLI 与集成测试共用的装配入口; 仓储与配置共享一个连接
pub struct AppState {
    pub db_path: String,
    pub schedule_api: Arc<ScheduleApi>,
    pub config_api: Arc<ConfigApi>,
}

impl AppState {
    /// 打开 (必要时新建) 数据库并装配各层
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!(db_path = %db_path, "打开计划数据库");

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("打开数据库 {} 失败: {}", db_path, e))?;
        ensure_schema(&conn).map_err(|e| format!("初始化表结构失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        let logs = Arc::new(ActionLogRepository::new(conn.clone()));
        let schedules = Arc::new(ScheduleRepository::new(conn.clone()));
        let config = Arc::new(ConfigManager::from_connection(conn).map_err(|e| format!("加载配置失败: {}", e))?);

        Ok(Self {
            schedule_api: Arc::new(ScheduleApi::new(schedules, logs.clone(), config.clone())),
            config_api: Arc::new(ConfigApi::new(config, logs)),
            db_path,
        })
    }
}

/// 默认数据库路径: MPS_ENGINE_DB_PATH > 用户数据目录/mps-engine > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("MPS_ENGINE_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let path = dirs::data_dir()
        .map(|base| base.join("mps-engine"))
        .filter(|dir| std::fs::create_dir_all(dir).is_ok())
        .map(|dir| dir.join("mps_engine.db"))
        .unwrap_or_else(|| PathBuf::from("./mps_engine.db"));

    path.to_string_lossy().into_owned()
}
