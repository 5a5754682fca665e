mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cqu-ics")]
#[command(about = "重庆大学课表/考试安排导出工具")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 启用详细日志
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 获取课程表并生成ICS文件
    Courses {
        /// 用户名/学号
        #[arg(short, long)]
        username: String,

        /// 密码
        #[arg(short = 'P', long)]
        password: String,

        /// 学期第一天（格式：YYYY-MM-DD，如 2020-08-31）
        #[arg(short = 's', long)]
        start_date: String,

        /// 学期编号，缺省时使用教务网提供的最新学期
        #[arg(short, long)]
        term: Option<i32>,

        /// 输出文件路径
        #[arg(short, long)]
        output: Option<String>,

        /// 日历名称
        #[arg(long)]
        calendar_name: Option<String>,

        /// 教务网地址
        #[arg(long)]
        base_url: Option<String>,
    },

    /// 获取考试安排并生成ICS文件
    Exams {
        /// 用户名/学号
        #[arg(short, long)]
        username: String,

        /// 密码
        #[arg(short = 'P', long)]
        password: String,

        /// 学期编号，缺省时使用教务网提供的最新学期
        #[arg(short, long)]
        term: Option<i32>,

        /// 输出文件路径
        #[arg(short, long)]
        output: Option<String>,

        /// 教务网地址
        #[arg(long)]
        base_url: Option<String>,
    },

    /// 列出课程表与考试安排的学期
    Terms {
        /// 用户名/学号
        #[arg(short, long)]
        username: String,

        /// 密码
        #[arg(short = 'P', long)]
        password: String,

        /// 教务网地址
        #[arg(long)]
        base_url: Option<String>,
    },

    /// 通过老教务网查询成绩单
    Scores {
        /// 用户名/学号
        #[arg(short, long)]
        username: String,

        /// 老教务网密码（默认为身份证后六位）
        #[arg(short = 'P', long)]
        password: String,
    },

    /// 验证用户凭据
    Validate {
        /// 用户名/学号
        #[arg(short, long)]
        username: String,

        /// 密码
        #[arg(short = 'P', long)]
        password: String,

        /// 教务网地址
        #[arg(long)]
        base_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 设置日志级别
    let log_level = if cli.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("cqu_ics_cli={log_level},cqu_ics_core={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Courses {
            username,
            password,
            start_date,
            term,
            output,
            calendar_name,
            base_url,
        } => {
            commands::courses_command(commands::CoursesParams {
                username,
                password,
                start_date,
                term,
                output,
                calendar_name,
                base_url,
            })
            .await
        }

        Commands::Exams {
            username,
            password,
            term,
            output,
            base_url,
        } => {
            commands::exams_command(commands::ExamsParams {
                username,
                password,
                term,
                output,
                base_url,
            })
            .await
        }

        Commands::Terms {
            username,
            password,
            base_url,
        } => commands::terms_command(username, password, base_url).await,

        Commands::Scores { username, password } => {
            commands::scores_command(username, password).await
        }

        Commands::Validate {
            username,
            password,
            base_url,
        } => commands::validate_command(username, password, base_url).await,
    }
}
