mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use picoclaw_agent::{AnthropicProvider, ChatRequest, LlmProvider, Message, OpenAiCompatProvider, Role};
use picoclaw_caldav::CalDavClient;
use picoclaw_core::config::PicoclawConfig;
use picoclaw_dedup::DedupEngine;
use picoclaw_scheduler::{CronService, HeartbeatService, JobStore, SubagentManager};
use picoclaw_skillpack::briefing::BriefingSources;
use picoclaw_skillpack::{BriefingSkill, DeadlineSkill, HabitSkill, NewsSkill, ResearchSkill, TaskSkill};
use picoclaw_skills::{SkillContext, SkillRegistry, Workspace};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let debug = matches!(cli.command, Commands::Gateway { debug: true });
    init_logging(debug);

    match &cli.command {
        Commands::Version => {
            println!("picoclaw {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Setup => {
            println!(
                "The interactive setup wizard is not implemented by picoclaw's core. \
                 Hand-edit ~/.picoclaw/config.json (see DESIGN.md for the key reference) instead."
            );
            Ok(())
        }
        Commands::Agent { message } => run_agent(&cli, message.clone()).await,
        Commands::Gateway { .. } => run_gateway(&cli).await,
    }
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "picoclaw=debug" } else { "picoclaw=info" };
    let filter = EnvFilter::try_from_env("PICOCLAW_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).try_init();
}

fn config_path_arg(cli: &Cli) -> Option<String> {
    cli.config.as_ref().map(|p| p.display().to_string())
}

/// Everything the two run modes need built once: config, the skill
/// registry (each skill wired to its own personality-named sibling
/// workspace), and the selected LM provider.
struct Runtime {
    config: PicoclawConfig,
    registry: SkillRegistry,
    provider: Arc<dyn LlmProvider>,
    deadlines_dashboard_path: PathBuf,
    task_mirror_path: PathBuf,
    workspace_root: PathBuf,
}

fn build_runtime(cli: &Cli) -> anyhow::Result<Runtime> {
    let config = PicoclawConfig::load(config_path_arg(cli).as_deref()).context("loading config")?;

    let workspace_root = PathBuf::from(picoclaw_core::config::default_workspace_root());
    let atc_dir = workspace_root.join("atc");
    let architect_dir = workspace_root.join("architect");
    let monitor_dir = workspace_root.join("monitor");
    let scout_dir = workspace_root.join("scout");
    let coach_dir = workspace_root.join("coach");
    let chief_dir = workspace_root.join("chief");

    let mut registry = SkillRegistry::new();

    if let Some(nextcloud) = &config.tools.nextcloud {
        let urls = nextcloud.resolve_urls().context("resolving Nextcloud endpoint URLs")?;
        let tasks_client = CalDavClient::with_timeout(&urls.tasks_url, &nextcloud.username, &nextcloud.password, nextcloud.timeout_seconds);
        let calendar_client =
            CalDavClient::with_timeout(&urls.calendar_url, &nextcloud.username, &nextcloud.password, nextcloud.timeout_seconds);

        let task_skill = Arc::new(TaskSkill::new(tasks_client.clone(), calendar_client.clone()));
        task_skill.set_workspace(Workspace::new(atc_dir.clone()))?;
        registry.register(task_skill);

        let deadline_skill = Arc::new(DeadlineSkill::new(tasks_client.clone(), calendar_client));
        deadline_skill.set_workspace(Workspace::new(architect_dir.clone()))?;
        registry.register(deadline_skill);

        let habit_skill = Arc::new(HabitSkill::new(
            tasks_client,
            urls.files_url.clone(),
            urls.deck_url.clone(),
            nextcloud.username.clone(),
            nextcloud.password.clone(),
            config.tools.telegram.clone(),
        ));
        habit_skill.set_workspace(Workspace::new(coach_dir.clone()))?;
        registry.register(habit_skill);
    } else {
        tracing::warn!("tools.nextcloud is not configured — task, deadline, and habit skills are unavailable");
    }

    let dedup_db_path = monitor_dir.join("memory").join("dedup.db");
    std::fs::create_dir_all(dedup_db_path.parent().unwrap()).context("creating monitor memory dir")?;
    let dedup_conn = rusqlite::Connection::open(&dedup_db_path).context("opening dedup.db")?;
    let dedup = DedupEngine::new(dedup_conn).context("initializing dedup engine")?;
    let news_skill = Arc::new(NewsSkill::new(config.monitor.feeds.clone(), chief_dir.join("memory"), dedup));
    news_skill.set_workspace(Workspace::new(monitor_dir.clone()))?;
    registry.register(news_skill);

    let research_skill = Arc::new(ResearchSkill::new(chief_dir.join("memory"), "https://export.arxiv.org", None));
    research_skill.set_workspace(Workspace::new(scout_dir.clone()))?;
    registry.register(research_skill);

    let briefing_skill = Arc::new(BriefingSkill::new(BriefingSources {
        task_mirror_path: atc_dir.join("memory").join("tasks.xml"),
        deadlines_dashboard_path: architect_dir.join("memory").join("deadlines-today.md"),
        news_memory_dir: chief_dir.join("memory"),
        research_memory_dir: chief_dir.join("memory"),
    }));
    briefing_skill.set_workspace(Workspace::new(chief_dir.clone()))?;
    registry.register(briefing_skill);

    let provider = build_provider(&config)?;

    Ok(Runtime {
        task_mirror_path: atc_dir.join("memory").join("tasks.xml"),
        deadlines_dashboard_path: architect_dir.join("memory").join("deadlines-today.md"),
        config,
        registry,
        provider,
        workspace_root,
    })
}

/// Picks the provider named by `agents.defaults.provider`, falling back to
/// whichever of `providers.anthropic`/`providers.openai` is configured
/// (spec.md §4.5 — "the language-model endpoint is out of scope, only the
/// interface is specified").
fn build_provider(config: &PicoclawConfig) -> anyhow::Result<Arc<dyn LlmProvider>> {
    match config.agents.defaults.provider.as_str() {
        "openai" => {
            let openai = config.providers.openai.as_ref().context("agents.defaults.provider is 'openai' but providers.openai is not configured")?;
            Ok(Arc::new(OpenAiCompatProvider::new(openai.api_key.clone(), Some(openai.api_base.clone()))))
        }
        _ => {
            let anthropic = config
                .providers
                .anthropic
                .as_ref()
                .context("agents.defaults.provider is 'anthropic' but providers.anthropic is not configured")?;
            Ok(Arc::new(AnthropicProvider::new(anthropic.api_key.clone(), Some(anthropic.api_base.clone()))))
        }
    }
}

async fn run_agent(cli: &Cli, message: Option<String>) -> anyhow::Result<()> {
    let runtime = build_runtime(cli)?;
    let ctx = SkillContext::internal();
    let cancel = CancellationToken::new();

    let tool_definitions: Vec<_> = runtime.registry.tool_definitions().into_iter().map(Into::into).collect();

    let turn = |text: String| {
        let model = runtime.config.agents.defaults.model.clone();
        let max_tokens = runtime.config.agents.defaults.max_tokens;
        let temperature = runtime.config.agents.defaults.temperature;
        let max_iterations = runtime.config.agents.defaults.max_tool_iterations;
        let tools = tool_definitions.clone();
        let provider = runtime.provider.clone();
        let registry = &runtime.registry;
        let ctx = &ctx;
        let cancel = cancel.clone();
        async move {
            let mut request = ChatRequest::new(model, "You are picoclaw, a personal-assistant orchestrator.");
            request.max_tokens = max_tokens;
            request.temperature = temperature;
            request.tools = tools;
            request.messages.push(Message { role: Role::User, content: text });

            picoclaw_agent::run_tool_loop(provider.as_ref(), registry, ctx, request, max_iterations, cancel).await
        }
    };

    if let Some(text) = message {
        let response = turn(text).await.context("running tool-call loop")?;
        println!("{}", response.content);
        return Ok(());
    }

    println!("picoclaw agent — interactive mode. Type a message, Ctrl-D to exit.");
    let stdin = std::io::stdin();
    loop {
        let mut line = String::new();
        if stdin.read_line(&mut line).context("reading stdin")? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match turn(line.to_string()).await {
            Ok(response) => println!("{}", response.content),
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

async fn run_gateway(cli: &Cli) -> anyhow::Result<()> {
    let runtime = build_runtime(cli)?;
    let root_cancel = CancellationToken::new();

    let registry = Arc::new(runtime.registry);
    let provider = runtime.provider;
    let config = runtime.config;
    let loop_runner = Arc::new(picoclaw_agent::ToolLoopRunner::new(provider, registry.clone()));

    let _subagents = SubagentManager::new(root_cancel.clone());
    let _channels = picoclaw_channels::ChannelManager::new();

    let jobs_path = runtime.workspace_root.join("jobs.json");
    let job_store = Arc::new(JobStore::open(&jobs_path).context("opening job store")?);
    let cron = CronService::new(job_store);

    let heartbeat = HeartbeatService::new(&config.heartbeat, runtime.deadlines_dashboard_path, runtime.task_mirror_path);

    tracing::info!("picoclaw gateway starting");

    let heartbeat_task = heartbeat.map(|service| {
        let runner = loop_runner.clone();
        let cancel = root_cancel.clone();
        tokio::spawn(async move {
            let max_iterations = picoclaw_agent::DEFAULT_MAX_ITERATIONS;
            // `run` drives on_outcome and drive through the same boxed future
            // type, so both closures below box their async block rather than
            // relying on two distinct opaque types unifying.
            service
                .run(
                    cancel.clone(),
                    |outcome| -> std::pin::Pin<Box<dyn std::future::Future<Output = String> + Send>> {
                        Box::pin(async move {
                            if let picoclaw_scheduler::HeartbeatOutcome::Reply(text) = outcome {
                                tracing::info!(%text, "heartbeat produced a reply");
                            }
                            picoclaw_scheduler::HEARTBEAT_OK.to_string()
                        })
                    },
                    move |prompt: &'static str| -> std::pin::Pin<Box<dyn std::future::Future<Output = String> + Send>> {
                        let runner = runner.clone();
                        let cancel = cancel.clone();
                        Box::pin(async move {
                            let ctx = SkillContext::internal();
                            let mut request = ChatRequest::new("claude-sonnet-4-6", "You are picoclaw's heartbeat check.");
                            request.messages.push(Message { role: Role::User, content: prompt.to_string() });
                            match runner.run(&ctx, request, max_iterations, cancel).await {
                                Ok(resp) => resp.content,
                                Err(e) => {
                                    tracing::warn!(error = %e, "heartbeat tool loop failed");
                                    picoclaw_scheduler::HEARTBEAT_OK.to_string()
                                }
                            }
                        })
                    },
                )
                .await;
        })
    });

    let cron_cancel = root_cancel.clone();
    let cron_runner = loop_runner.clone();
    let cron_task = tokio::spawn(async move {
        cron.run(cron_cancel.clone(), |job| {
            let runner = cron_runner.clone();
            let cancel = cron_cancel.clone();
            async move {
                let ctx = SkillContext { origin: job.origin };
                let mut request = ChatRequest::new("claude-sonnet-4-6", "You are picoclaw running a scheduled job.");
                request.messages.push(Message { role: Role::User, content: job.payload });
                if let Err(e) = runner.run(&ctx, request, picoclaw_agent::DEFAULT_MAX_ITERATIONS, cancel).await {
                    tracing::warn!(job = %job.name, error = %e, "scheduled job failed");
                }
            }
        })
        .await;
    });

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown signal received, cancelling in-flight work");
    root_cancel.cancel();

    if let Some(task) = heartbeat_task {
        let _ = task.await;
    }
    let _ = cron_task.await;

    Ok(())
}
