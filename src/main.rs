// ==========================================
// 主生产计划引擎 - 命令行入口
// ==========================================
// 用法:
//   mps-engine [db_path] init
//   mps-engine [db_path] list
//   mps-engine [db_path] report <schedule_number>
//   mps-engine [db_path] import <schedule_number> <file> [actor]
// 环境变量: RUST_LOG 控制级别, MPS_LOG_FORMAT=json 输出 JSON 日志
// ==========================================

use std::error::Error;

use mps_engine::api::ScheduleView;
use mps_engine::app::{get_default_db_path, AppState};
use mps_engine::logging;

const COMMANDS: [&str; 4] = ["init", "list", "report", "import"];

fn usage() -> String {
    [
        "用法: mps-engine [db_path] <command>",
        "  init                                  建库",
        "  list                                  列出全部计划",
        "  report <schedule_number>              输出计划明细",
        "  import <schedule_number> <file> [actor]  导入需求预测 (CSV/Excel)",
    ]
    .join("\n")
}

fn main() -> Result<(), Box<dyn Error>> {
    logging::init_from_env();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let db_path = match args.first() {
        Some(first) if !COMMANDS.contains(&first.as_str()) => args.remove(0),
        _ => get_default_db_path(),
    };
    if args.is_empty() {
        eprintln!("{}", usage());
        std::process::exit(2);
    }

    tracing::info!("{} v{} 使用数据库: {}", mps_engine::APP_NAME, mps_engine::VERSION, db_path);
    let state = AppState::new(db_path)?;

    match (args[0].as_str(), &args[1..]) {
        ("init", []) => {
            println!("数据库已就绪: {}", state.db_path);
        }
        ("list", []) => {
            let schedules = state.schedule_api.list_schedules(None)?;
            if schedules.is_empty() {
                println!("(无计划)");
            }
            for s in schedules {
                println!(
                    "{:<20} {:<10} {:<8} {} ~ {}  rev={}  {}",
                    s.schedule_number,
                    s.status,
                    s.period_type,
                    s.period_start,
                    s.period_end,
                    s.revision,
                    s.name
                );
            }
        }
        ("report", [number]) => {
            let view = state.schedule_api.get_schedule_by_number(number)?;
            print_report(&view);
        }
        ("import", [number, file, rest @ ..]) if rest.len() <= 1 => {
            let actor = rest.first().map(String::as_str).unwrap_or("cli");
            let view = state.schedule_api.get_schedule_by_number(number)?;
            let now = chrono::Local::now().naive_local();
            let response = state.schedule_api.import_forecast(
                &view.header.schedule_id,
                file,
                actor,
                now,
            )?;
            println!(
                "导入完成: 新增 {} 行, 更新 {} 行, 余额变化 {} 处",
                response.added,
                response.updated,
                response.outcome.balance_changes.len()
            );
            print_report(&response.schedule);
        }
        _ => {
            eprintln!("{}", usage());
            std::process::exit(2);
        }
    }

    Ok(())
}

fn print_report(view: &ScheduleView) {
    let h = &view.header;
    println!("==================================================");
    println!("{}  {}  [{}]", h.schedule_number, h.name, h.status);
    println!(
        "期间: {} ~ {} ({})  围栏: 冻结 {} / 半冻结 {} / 自由 {} 天",
        h.period_start,
        h.period_end,
        h.period_type,
        h.fences.frozen_days,
        h.fences.slushy_days,
        h.fences.free_days
    );
    if let Some(description) = &h.description {
        println!("说明: {}", description);
    }
    println!("==================================================");

    for summary in &view.summary {
        println!();
        println!("产品 {}", summary.product_id);
        println!(
            "{:>4} {:<12} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}  标记",
            "期", "周期", "毛需求", "计划生产", "实际生产", "安全库存", "PAB", "ATP"
        );
        for line in view.lines.iter().filter(|l| l.product_id == summary.product_id) {
            let atp = line
                .available_to_promise
                .map(|v| format!("{:.2}", v))
                .unwrap_or_else(|| "-".to_string());
            let mut flags = Vec::new();
            if line.is_below_safety_stock() {
                flags.push("低于安全库存");
            }
            if line.requires_reapproval {
                flags.push("待重新审批");
            }
            println!(
                "{:>4} {:<12} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10}  {}",
                line.period_number,
                line.period_date.to_string(),
                line.gross_demand(),
                line.planned_production_qty,
                line.actual_production_qty,
                line.safety_stock,
                line.projected_available_balance,
                atp,
                flags.join(",")
            );
        }
        println!(
            "合计: 毛需求 {:.2}  计划生产 {:.2}  生产偏差 {:.2}  期末 PAB {:.2}",
            summary.total_gross_demand,
            summary.total_planned_production,
            summary.total_variance,
            summary.ending_balance
        );
    }

    if !view.safety_stock_warnings.is_empty() {
        println!();
        println!("安全库存警告 ({}):", view.safety_stock_warnings.len());
        for w in &view.safety_stock_warnings {
            println!(
                "  {} {}  PAB {:.2} < 安全库存 {:.2} (缺口 {:.2})",
                w.product_id, w.period_date, w.projected_available_balance, w.safety_stock, w.shortfall
            );
        }
    }
}
