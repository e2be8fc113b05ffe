//! Line-oriented editing loop: click nodes by id, apply cuts and retrains,
//! fine-tune and confirm or revert, all against one open session.

use std::io::Write;

use anyhow::{bail, Result};
use editor_core::{report, EditorError, EditorEvent, EditorSession, Phase};
use shared::{
    domain::NodeId,
    protocol::{CutDirection, DistillParams, FineTuneParams, ModelToUse},
};
use tokio::{
    io::{stdin, AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};

const HELP: &str = "\
commands:
  show                   print the tree outline
  json                   print the laid-out diagram as JSON
  status                 stage, selection and pending fine-tune
  click <id>             select a split node, or deselect it when already selected
  clear                  clear the selection
  cut [auto|left|right]  collapse the selected node into a leaf
  retrain                refit the subtree under the selected node
  finetune               fine-tune the network against the edited tree
  confirm                keep the fine-tuned network
  revert                 discard the fine-tuned network
  distill [original|latest]
  help
  quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplCommand {
    Show,
    Json,
    Status,
    Click(NodeId),
    Clear,
    Cut(CutDirection),
    Retrain,
    FineTune,
    Confirm,
    Revert,
    Distill(ModelToUse),
    Help,
    Quit,
}

fn parse(line: &str) -> Result<Option<ReplCommand>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    if let Some(extra) = words.next() {
        bail!("unexpected argument '{extra}'");
    }

    let command = match (verb, arg) {
        ("show" | "s", None) => ReplCommand::Show,
        ("json", None) => ReplCommand::Json,
        ("status", None) => ReplCommand::Status,
        ("click" | "select", Some(id)) => match id.parse() {
            Ok(id) => ReplCommand::Click(NodeId(id)),
            Err(_) => bail!("'{id}' is not a node id"),
        },
        ("clear", None) => ReplCommand::Clear,
        ("cut", None | Some("auto")) => ReplCommand::Cut(CutDirection::Auto),
        ("cut", Some("left")) => ReplCommand::Cut(CutDirection::Left),
        ("cut", Some("right")) => ReplCommand::Cut(CutDirection::Right),
        ("retrain", None) => ReplCommand::Retrain,
        ("finetune" | "fine-tune", None) => ReplCommand::FineTune,
        ("confirm", None) => ReplCommand::Confirm,
        ("revert", None) => ReplCommand::Revert,
        ("distill", None | Some("latest")) => ReplCommand::Distill(ModelToUse::Latest),
        ("distill", Some("original")) => ReplCommand::Distill(ModelToUse::Original),
        ("help" | "?", None) => ReplCommand::Help,
        ("quit" | "exit" | "q", None) => ReplCommand::Quit,
        _ => bail!("unknown command '{}'; try 'help'", line.trim()),
    };
    Ok(Some(command))
}

pub async fn run(session: &EditorSession) -> Result<()> {
    let mut events = session.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(EditorEvent::Notification(note)) => match note.description() {
                    Some(description) => eprintln!("! {}: {description}", note.title()),
                    None => eprintln!("! {}", note.title()),
                },
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("{HELP}");
    crate::print_outline(session).await?;

    let mut lines = BufReader::new(stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = match parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };
        if command == ReplCommand::Quit {
            break;
        }
        if let Err(err) = execute(session, command).await {
            // Service failures were already shown as notifications.
            let notified = err
                .downcast_ref::<EditorError>()
                .is_some_and(EditorError::raises_notification);
            if !notified {
                eprintln!("error: {err:#}");
            }
        }
    }

    printer.abort();
    Ok(())
}

async fn execute(session: &EditorSession, command: ReplCommand) -> Result<()> {
    let controller = session.controller();
    match command {
        ReplCommand::Show => crate::print_outline(session).await?,
        ReplCommand::Json => {
            let diagram = controller.diagram().await?;
            println!("{}", serde_json::to_string_pretty(&diagram)?);
        }
        ReplCommand::Status => {
            println!("stage     {}", session.stage().await);
            match controller.phase().await {
                Phase::Idle => println!("selection none"),
                Phase::Selected(node_id) => println!("selection {node_id}"),
                Phase::Working => println!("working"),
            }
            if let Some(result) = controller.pending_fine_tune().await {
                println!("fine-tune awaiting confirm or revert:");
                print!("{}", report::metrics_table(&report::fine_tune_rows(&result)));
            }
        }
        ReplCommand::Click(node_id) => {
            match controller.click_node(node_id).await {
                Phase::Selected(selected) => println!("selected {selected}"),
                Phase::Idle => println!("nothing selected"),
                Phase::Working => println!("busy"),
            }
        }
        ReplCommand::Clear => {
            controller.click_background().await;
        }
        ReplCommand::Cut(direction) => {
            let result = controller.cut(direction).await?;
            print!("{}", report::metrics_table(&report::modify_rows(&result)));
            crate::print_outline(session).await?;
        }
        ReplCommand::Retrain => {
            let result = controller.retrain().await?;
            print!("{}", report::metrics_table(&report::modify_rows(&result)));
            crate::print_outline(session).await?;
        }
        ReplCommand::FineTune => {
            let result = controller.fine_tune(&FineTuneParams::default()).await?;
            print!("{}", report::metrics_table(&report::fine_tune_rows(&result)));
            println!("confirm to keep the fine-tuned network, revert to discard it");
        }
        ReplCommand::Confirm => {
            let result = controller.confirm(&DistillParams::default()).await?;
            print!("{}", report::metrics_table(&report::distill_rows(&result)));
            crate::print_outline(session).await?;
        }
        ReplCommand::Revert => {
            let result = controller.revert(&DistillParams::default()).await?;
            print!("{}", report::metrics_table(&report::distill_rows(&result)));
            crate::print_outline(session).await?;
        }
        ReplCommand::Distill(model) => {
            let params = DistillParams::default().with_model(model);
            let result = session.distill(&params).await?;
            print!("{}", report::metrics_table(&report::distill_rows(&result)));
            crate::print_outline(session).await?;
        }
        ReplCommand::Help => println!("{HELP}"),
        ReplCommand::Quit => {}
    }
    Ok(())
}
