//! `council` — inspect and drive coordination state from the shell.
//!
//! State lives in a file store under `state_dir` (config file, then
//! `COUNCIL_*` environment, then `--state-dir`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use council_coordination::{
    AgentId, CapabilityProfile, ConcernDraft, ConcernPriority, CoordinationConfig, Coordinator,
    DecisionDraft, EscalationRequest, EscalationResponse, FileStore, MessageDraft, MessageKind,
    NextAction, Phase, ResolutionDraft,
};
use serde::Serialize;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State directory (overrides config and COUNCIL_STATE_DIR)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Session whose active orchestration is used when no id is given
    #[arg(long, global = true, default_value = "default")]
    session: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an orchestration for a task
    Create {
        task: String,
        #[arg(long)]
        architecture_review: bool,
        #[arg(long)]
        security_review: bool,
    },
    /// Print an orchestration (the session's active one by default)
    Show { id: Option<String> },
    /// Move an orchestration to another phase
    Transition { id: String, phase: Phase },
    /// Mark an orchestration failed
    Fail { id: String, reason: String },
    #[command(subcommand)]
    Gate(GateCommand),
    /// Append a decision to the ledger
    Decide(DecideArgs),
    #[command(subcommand)]
    Debate(DebateCommand),
    #[command(subcommand)]
    Escalate(EscalateCommand),
}

#[derive(Subcommand, Debug)]
enum GateCommand {
    /// Propose entering `target`; the approver defaults to the policy's choice
    Open {
        orch: String,
        target: Phase,
        summary: String,
        #[arg(long)]
        approver: Option<String>,
    },
    Approve {
        orch: String,
        gate: String,
        #[arg(long)]
        by: String,
    },
    Reject {
        orch: String,
        gate: String,
        feedback: String,
        #[arg(long)]
        by: String,
    },
    Skip {
        orch: String,
        gate: String,
        #[arg(long)]
        by: String,
    },
}

#[derive(Args, Debug)]
struct DecideArgs {
    orch: String,
    topic: String,
    chosen: String,
    rationale: String,
    #[arg(long)]
    by: String,
    /// Alternative that was considered (repeatable)
    #[arg(long = "option")]
    options: Vec<String>,
    #[arg(long)]
    debate: Option<String>,
}

#[derive(Subcommand, Debug)]
enum DebateCommand {
    Open {
        topic: String,
        /// Participant agent (repeatable)
        #[arg(long = "participant", required = true)]
        participants: Vec<String>,
        #[arg(long)]
        moderator: Option<String>,
        #[arg(long)]
        context: Option<String>,
        #[arg(long)]
        max_rounds: Option<u32>,
    },
    /// Post a message
    Say {
        debate: String,
        content: String,
        #[arg(long)]
        from: String,
        #[arg(long, value_enum, default_value_t = KindArg::Proposal)]
        kind: KindArg,
        #[arg(long)]
        reply_to: Option<String>,
    },
    Concern {
        debate: String,
        description: String,
        #[arg(long)]
        from: String,
        #[arg(long, value_enum, default_value_t = PriorityArg::Medium)]
        priority: PriorityArg,
        #[arg(long = "affects")]
        affects: Vec<String>,
    },
    Advance { debate: String },
    Resolve {
        debate: String,
        decision: String,
        rationale: String,
        #[arg(long)]
        by: String,
        #[arg(long)]
        consensus: bool,
        #[arg(long)]
        winning: Option<String>,
    },
    Show { debate: String },
}

#[derive(Subcommand, Debug)]
enum EscalateCommand {
    Open {
        kind: String,
        message: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        context: Option<String>,
    },
    Respond {
        thread: String,
        message: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        resolved: bool,
        #[arg(long, conflicts_with = "ask_user")]
        reroute_to: Option<String>,
        #[arg(long)]
        ask_user: bool,
    },
    /// Print the user-facing summary of a thread
    Show { thread: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Proposal,
    Counter,
    Support,
    Question,
    Clarify,
    Acknowledge,
}

impl From<KindArg> for MessageKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Proposal => MessageKind::Proposal,
            KindArg::Counter => MessageKind::Counter,
            KindArg::Support => MessageKind::Support,
            KindArg::Question => MessageKind::Question,
            KindArg::Clarify => MessageKind::Clarify,
            KindArg::Acknowledge => MessageKind::Acknowledge,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PriorityArg {
    Low,
    Medium,
    High,
    Blocker,
}

impl From<PriorityArg> for ConcernPriority {
    fn from(priority: PriorityArg) -> Self {
        match priority {
            PriorityArg::Low => ConcernPriority::Low,
            PriorityArg::Medium => ConcernPriority::Medium,
            PriorityArg::High => ConcernPriority::High,
            PriorityArg::Blocker => ConcernPriority::Blocker,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("council_coordination=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = run(cli)?;
    println!("{output}");
    Ok(())
}

fn open_coordinator(cli: &Cli) -> Result<Coordinator> {
    let mut config =
        CoordinationConfig::resolve(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(dir) = &cli.state_dir {
        config.state_dir = dir.clone();
    }
    debug!(state_dir = %config.state_dir.display(), "Opening state store");
    let store = FileStore::open(&config.state_dir)
        .with_context(|| format!("Failed to open state dir {}", config.state_dir.display()))?;
    Ok(Coordinator::with_defaults(store.shared(), config))
}

fn json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to render output")
}

fn run(cli: Cli) -> Result<String> {
    let council = open_coordinator(&cli)?;
    let agent = |name: &str| -> Result<AgentId> {
        council
            .config()
            .agent(name)
            .with_context(|| format!("Invalid agent name '{}'", name))
    };

    match cli.command {
        Command::Create {
            ref task,
            architecture_review,
            security_review,
        } => {
            let capabilities = CapabilityProfile {
                needs_architecture_review: architecture_review,
                needs_security_review: security_review,
            };
            let state = council.create_with_capabilities(task, &cli.session, capabilities)?;
            Ok(state.id)
        }
        Command::Show { ref id } => {
            let state = match id {
                Some(id) => council.get_orchestration(id)?,
                None => council
                    .active_orchestration(&cli.session)?
                    .with_context(|| format!("No active orchestration for session {}", cli.session))?,
            };
            json(&state)
        }
        Command::Transition { ref id, phase } => {
            Ok(council.transition_phase(id, phase)?.status_line())
        }
        Command::Fail { ref id, ref reason } => Ok(council.fail(id, reason)?.status_line()),
        Command::Gate(ref gate) => run_gate(&council, gate, &agent),
        Command::Decide(ref args) => {
            let mut draft = DecisionDraft::new(
                args.topic.as_str(),
                args.chosen.as_str(),
                args.rationale.as_str(),
                agent(&args.by)?,
            )
            .with_options(args.options.iter().cloned());
            if let Some(debate) = &args.debate {
                draft = draft.from_debate(debate.as_str());
            }
            Ok(council.record_decision(&args.orch, draft)?.id)
        }
        Command::Debate(ref debate) => run_debate(&council, debate, &agent),
        Command::Escalate(ref escalate) => run_escalate(&council, escalate, &agent),
    }
}

fn run_gate(
    council: &Coordinator,
    command: &GateCommand,
    agent: &dyn Fn(&str) -> Result<AgentId>,
) -> Result<String> {
    match command {
        GateCommand::Open {
            orch,
            target,
            summary,
            approver,
        } => {
            let approver = match approver {
                Some(name) => agent(name)?,
                None => match council.required_gate(orch, *target)? {
                    Some(approver) => approver,
                    None => council.config().pm_agent_id()?,
                },
            };
            Ok(council.create_gate(orch, *target, summary, approver)?.id)
        }
        GateCommand::Approve { orch, gate, by } => {
            Ok(council.approve_gate(orch, gate, agent(by)?)?.status_line())
        }
        GateCommand::Reject {
            orch,
            gate,
            feedback,
            by,
        } => {
            let rejection = council.reject_gate(orch, gate, feedback, agent(by)?)?;
            let mut line = format!("revision {}", rejection.revision_count);
            if let Some(thread) = rejection.escalation {
                line.push_str(&format!(", escalated as {}", thread.id));
            }
            Ok(line)
        }
        GateCommand::Skip { orch, gate, by } => {
            Ok(council.skip_gate(orch, gate, agent(by)?)?.status_line())
        }
    }
}

fn run_debate(
    council: &Coordinator,
    command: &DebateCommand,
    agent: &dyn Fn(&str) -> Result<AgentId>,
) -> Result<String> {
    match command {
        DebateCommand::Open {
            topic,
            participants,
            moderator,
            context,
            max_rounds,
        } => {
            let room = council.create_debate(
                topic,
                participants
                    .iter()
                    .map(|p| agent(p))
                    .collect::<Result<Vec<_>>>()?,
                moderator.as_deref().map(agent).transpose()?,
                context.clone(),
                *max_rounds,
            )?;
            Ok(room.id)
        }
        DebateCommand::Say {
            debate,
            content,
            from,
            kind,
            reply_to,
        } => {
            let mut draft = MessageDraft::new(agent(from)?, (*kind).into(), content.as_str());
            if let Some(id) = reply_to {
                draft = draft.replying_to(id.as_str());
            }
            Ok(council.add_message(debate, draft)?.id)
        }
        DebateCommand::Concern {
            debate,
            description,
            from,
            priority,
            affects,
        } => {
            let draft = ConcernDraft::new(agent(from)?, description.as_str())
                .with_priority((*priority).into())
                .affecting(affects.iter().cloned());
            Ok(council.raise_concern(debate, draft)?.id)
        }
        DebateCommand::Advance { debate } => Ok(council.advance_round(debate)?.status_line()),
        DebateCommand::Resolve {
            debate,
            decision,
            rationale,
            by,
            consensus,
            winning,
        } => {
            let mut draft = ResolutionDraft::new(
                decision.as_str(),
                rationale.as_str(),
                agent(by)?,
                *consensus,
            );
            if let Some(id) = winning {
                draft = draft.winning(id.as_str());
            }
            Ok(council.resolve_debate(debate, draft)?.status_line())
        }
        DebateCommand::Show { debate } => json(&council.get_debate(debate)?),
    }
}

fn run_escalate(
    council: &Coordinator,
    command: &EscalateCommand,
    agent: &dyn Fn(&str) -> Result<AgentId>,
) -> Result<String> {
    match command {
        EscalateCommand::Open {
            kind,
            message,
            from,
            context,
        } => {
            let mut request =
                EscalationRequest::new(agent(from)?, kind.as_str(), message.as_str());
            if let Some(context) = context {
                request = request.with_context(context.as_str());
            }
            let thread = council.open_escalation(request)?;
            Ok(format!("{} → {}", thread.id, thread.assigned_to))
        }
        EscalateCommand::Respond {
            thread,
            message,
            from,
            resolved,
            reroute_to,
            ask_user,
        } => {
            let mut response = EscalationResponse::new(agent(from)?, message.as_str());
            if *resolved {
                response = response.resolving();
            }
            if let Some(to) = reroute_to {
                response = response.then(NextAction::Reroute { to: agent(to)? });
            } else if *ask_user {
                response = response.then(NextAction::AskUser);
            }
            let thread = council.respond(thread, response)?;
            Ok(format!("{} ({})", thread.status, thread.assigned_to))
        }
        EscalateCommand::Show { thread } => Ok(council.format_for_user(thread)?),
    }
}
