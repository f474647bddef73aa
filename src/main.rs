use anyhow::{anyhow, Result};
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;

mod cli;

use cli::{
    Command, ExpandArgs, FindArgs, PlaybookCommand, PlaybookListArgs, PlaybookNameArgs,
    PlaybookSaveArgs, RootArgs, RunArgs,
};
use seqrun::config::{resolve_playbooks_root, Roots, LOG_ENV};
use seqrun::context::parse_var_assignments;
use seqrun::util::{display_path, first_line};
use seqrun::{
    expand_sequence, find_scripts, orchestrate, CancellationToken, Collaborators,
    ExecutionContext, HeaderValidator, OrchestrationReport, Playbook, PlaybookStore,
    ProcessExecutor, RunRequest, RunTarget, SequenceSource,
};

const STDERR_PREVIEW_BYTES: usize = 200;

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    let result = match args.command {
        Command::Expand(args) => cmd_expand(&args),
        Command::Find(args) => cmd_find(&args),
        Command::Run(args) => cmd_run(&args),
        Command::Playbook(command) => cmd_playbook(command),
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cmd_expand(args: &ExpandArgs) -> Result<bool> {
    let ids = expand_sequence(&args.spec)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&ids)?);
    } else {
        for id in &ids {
            println!("{id}");
        }
    }
    Ok(true)
}

fn cmd_find(args: &FindArgs) -> Result<bool> {
    let roots = Roots::resolve(
        args.roots.scripts_root.as_deref(),
        args.roots.playbooks_root.as_deref(),
    )?;
    let ids = expand_sequence(&args.spec)?;
    let discovery = find_scripts(&roots.scripts, &ids)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&discovery)?);
        return Ok(true);
    }
    for record in &discovery.records {
        println!(
            "{}\t{}",
            record.id,
            display_path(&record.path, Some(&roots.scripts))
        );
    }
    for collision in &discovery.collisions {
        eprintln!("warning: {}", collision.describe());
    }
    for id in &discovery.missing {
        eprintln!("missing: {id}");
    }
    Ok(true)
}

fn cmd_run(args: &RunArgs) -> Result<bool> {
    let roots = Roots::resolve(
        args.roots.scripts_root.as_deref(),
        args.roots.playbooks_root.as_deref(),
    )?;
    let target = match (&args.sequence, &args.playbook) {
        (Some(spec), None) => RunTarget::Sequence(spec.clone()),
        (None, Some(name)) => RunTarget::Playbook(name.clone()),
        _ => return Err(anyhow!("exactly one of --sequence or --playbook is required")),
    };
    let context = ExecutionContext {
        variables: parse_var_assignments(&args.vars)?,
        args: args.script_args.clone(),
        dry_run: args.dry_run,
        parallel: args.parallel,
        max_concurrency: args.max_concurrency,
        stop_on_failure: args.stop_on_failure,
    };
    let store = PlaybookStore::new(&roots.playbooks);
    let executor = ProcessExecutor::new().with_timeout(args.timeout_secs.map(Duration::from_secs));
    let report = orchestrate(
        RunRequest {
            target,
            scripts_root: &roots.scripts,
            store: &store,
            context,
            validate_first: args.validate,
        },
        Collaborators {
            executor: &executor,
            validator: &HeaderValidator,
            cancel: CancellationToken::new(),
        },
    )?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report.success)
}

fn print_report(report: &OrchestrationReport) {
    for outcome in &report.outcomes {
        let status = match (report.dry_run, outcome.success) {
            (true, _) => "SKIP".to_string(),
            (false, true) => "OK".to_string(),
            (false, false) => match outcome.exit_code {
                Some(code) => format!("FAIL({code})"),
                None => "FAIL".to_string(),
            },
        };
        println!("{status:<9} {}", outcome.file_name);
        if !outcome.success {
            let detail = first_line(&outcome.stderr, STDERR_PREVIEW_BYTES);
            if !detail.is_empty() {
                println!("          {detail}");
            }
        }
    }
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    for error in &report.validation_errors {
        eprintln!("validation: {error}");
    }
    println!("{}", report.summary_line());
}

fn cmd_playbook(command: PlaybookCommand) -> Result<bool> {
    match command {
        PlaybookCommand::Save(args) => cmd_playbook_save(&args),
        PlaybookCommand::Show(args) => cmd_playbook_show(&args),
        PlaybookCommand::List(args) => cmd_playbook_list(&args),
        PlaybookCommand::Remove(args) => cmd_playbook_remove(&args),
    }
}

fn cmd_playbook_save(args: &PlaybookSaveArgs) -> Result<bool> {
    let store = PlaybookStore::new(resolve_playbooks_root(args.playbooks_root.as_deref())?);
    let playbook = Playbook::new(
        args.name.clone(),
        SequenceSource::Spec(args.sequence.clone()),
        parse_var_assignments(&args.vars)?,
    )
    .with_description(args.description.clone());
    let path = store.save(&args.name, &playbook, args.force)?;
    println!("saved playbook {} to {}", args.name, path.display());
    Ok(true)
}

fn cmd_playbook_show(args: &PlaybookNameArgs) -> Result<bool> {
    let store = PlaybookStore::new(resolve_playbooks_root(args.playbooks_root.as_deref())?);
    let playbook = store.load(&args.name)?;
    println!("{}", serde_json::to_string_pretty(&playbook)?);
    Ok(true)
}

fn cmd_playbook_list(args: &PlaybookListArgs) -> Result<bool> {
    let store = PlaybookStore::new(resolve_playbooks_root(args.playbooks_root.as_deref())?);
    let names = store.list()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else if names.is_empty() {
        eprintln!("no playbooks in {}", store.root().display());
    } else {
        for name in &names {
            println!("{name}");
        }
    }
    Ok(true)
}

fn cmd_playbook_remove(args: &PlaybookNameArgs) -> Result<bool> {
    let store = PlaybookStore::new(resolve_playbooks_root(args.playbooks_root.as_deref())?);
    store.remove(&args.name)?;
    println!(
        "removed playbook {} from {}",
        args.name,
        store.root().display()
    );
    Ok(true)
}
