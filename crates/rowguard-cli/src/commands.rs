//! Command handlers for the operator tool.

use std::error::Error;
use std::time::Duration;

use comfy_table::Table;
use rowguard_core::{
    AccessClass, AuditRecord, AuthzError, EngineConfig, GateConfig, IsolationEngine, ProjectId,
    RolloutPhase, TriageResolution,
};

use crate::{Args, AuditCommand, BypassCommand, Command, GrantCommand, PhaseCommand, ProjectCommand};

/// Open the engine and dispatch one command.
pub fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let engine = IsolationEngine::open(EngineConfig::new(&args.data_path))?;

    match args.command {
        Command::Project(cmd) => run_project(&engine, cmd),
        Command::Grant(cmd) => run_grant(&engine, cmd),
        Command::Phase(cmd) => run_phase(&engine, cmd),
        Command::Promote {
            project,
            check,
            min_observation_hours,
            min_observed_units,
        } => run_promote(
            &engine,
            &project,
            check,
            min_observation_hours,
            min_observed_units,
        ),
        Command::Audit(cmd) => run_audit(&engine, cmd),
        Command::Bypass(cmd) => run_bypass(&engine, cmd),
    }
}

fn run_project(engine: &IsolationEngine, cmd: ProjectCommand) -> Result<(), Box<dyn Error>> {
    match cmd {
        ProjectCommand::Add { id, name, class } => {
            let class: AccessClass = class.parse()?;
            let display_name = name.unwrap_or_else(|| id.clone());
            engine.register_project(id.as_str(), display_name, class)?;
            println!("Registered project '{}' ({})", id, class);
        }
        ProjectCommand::List => {
            let mut table = Table::new();
            table.set_header(vec!["Id", "Name", "Class", "Phase"]);
            for entry in engine.list_projects()? {
                let phase = engine.phase_of(&entry.id)?;
                table.add_row(vec![
                    entry.id.to_string(),
                    entry.display_name,
                    entry.access_class.to_string(),
                    phase.to_string(),
                ]);
            }
            println!("{table}");
        }
        ProjectCommand::Remove { id } => {
            if engine.remove_project(&ProjectId::new(id.as_str()))? {
                println!("Removed project '{}'", id);
            } else {
                println!("Project '{}' was not registered", id);
            }
        }
        ProjectCommand::SetClass { id, class } => {
            let class: AccessClass = class.parse()?;
            engine.set_access_class(&ProjectId::new(id.as_str()), class)?;
            println!("Project '{}' is now class '{}'", id, class);
        }
    }
    Ok(())
}

fn run_grant(engine: &IsolationEngine, cmd: GrantCommand) -> Result<(), Box<dyn Error>> {
    match cmd {
        GrantCommand::Add { reader, target } => {
            engine.grant_read(&ProjectId::new(reader.as_str()), &ProjectId::new(target.as_str()))?;
            println!(
                "Granted '{}' read access to '{}' (observation window reset)",
                reader, target
            );
        }
        GrantCommand::Remove { reader, target } => {
            let removed = engine
                .revoke_read(&ProjectId::new(reader.as_str()), &ProjectId::new(target.as_str()))?;
            if removed {
                println!("Revoked '{}' -> '{}'", reader, target);
            } else {
                println!("No grant '{}' -> '{}'", reader, target);
            }
        }
        GrantCommand::List { reader } => {
            let reader = reader.map(|r| ProjectId::new(r));
            let mut table = Table::new();
            table.set_header(vec!["Reader", "Target"]);
            for grant in engine.list_grants(reader.as_ref())? {
                table.add_row(vec![grant.reader.to_string(), grant.target.to_string()]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

fn run_phase(engine: &IsolationEngine, cmd: PhaseCommand) -> Result<(), Box<dyn Error>> {
    match cmd {
        PhaseCommand::Get { project } => {
            let id = ProjectId::new(project.as_str());
            match engine.rollout_status(&id)? {
                Some(status) => {
                    let mut table = Table::new();
                    table.set_header(vec!["Project", "Phase", "Transitioned At (µs)", "Window Start (µs)"]);
                    table.add_row(vec![
                        status.project_id.to_string(),
                        status.phase.to_string(),
                        status.transitioned_at.to_string(),
                        status
                            .observation_started_at
                            .map(|ts| ts.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                    ]);
                    println!("{table}");
                }
                None => println!(
                    "Project '{}' has no rollout status row (behaves as 'pending')",
                    project
                ),
            }
        }
        PhaseCommand::Set { project, phase } => {
            let phase: RolloutPhase = phase.parse()?;
            let status = engine.transition_phase(&ProjectId::new(project.as_str()), phase)?;
            println!("Project '{}' is now in phase '{}'", project, status.phase);
        }
        PhaseCommand::ResetObservation { project } => {
            engine.reset_observation(&ProjectId::new(project.as_str()))?;
            println!("Observation window reset for '{}'", project);
        }
    }
    Ok(())
}

fn run_promote(
    engine: &IsolationEngine,
    project: &str,
    check: bool,
    min_observation_hours: Option<u64>,
    min_observed_units: Option<u64>,
) -> Result<(), Box<dyn Error>> {
    let mut gate = GateConfig::default();
    if let Some(hours) = min_observation_hours {
        gate = gate.with_min_observation(Duration::from_secs(hours * 3600));
    }
    if let Some(units) = min_observed_units {
        gate = gate.with_min_observed_units(units);
    }

    let id = ProjectId::new(project);
    if check {
        let violations = engine.promotion_report_with(&id, &gate)?;
        if violations.is_empty() {
            println!("Project '{}' is ready for promotion", project);
        } else {
            println!("Project '{}' is NOT ready for promotion:", project);
            for violation in violations {
                println!("  - {}", violation);
            }
        }
        return Ok(());
    }

    match engine.promote_with(&id, &gate) {
        Ok(status) => {
            println!("Project '{}' promoted to '{}'", project, status.phase);
            Ok(())
        }
        Err(AuthzError::PromotionBlocked(violations)) => {
            eprintln!("Promotion of '{}' blocked:", project);
            for violation in violations {
                eprintln!("  - {}", violation);
            }
            Err("promotion blocked".into())
        }
        Err(e) => Err(e.into()),
    }
}

fn run_audit(engine: &IsolationEngine, cmd: AuditCommand) -> Result<(), Box<dyn Error>> {
    match cmd {
        AuditCommand::List {
            project,
            since_hours,
            untriaged,
            json,
        } => {
            let project = project.map(|p| ProjectId::new(p));
            let since = since_hours.map(|hours| {
                rowguard_core::clock::current_timestamp()
                    .saturating_sub(hours * 3600 * 1_000_000)
            });
            let mut records = engine.list_violations(project.as_ref(), since)?;
            if untriaged {
                records.retain(|r| !r.is_triaged());
            }

            if json {
                for record in &records {
                    println!("{}", serde_json::to_string(record)?);
                }
            } else {
                print_audit_table(&records);
            }
        }
        AuditCommand::Triage { id, resolution } => {
            let resolution: TriageResolution = resolution.parse()?;
            let record_id = AuditRecord::parse_id(&id)
                .ok_or_else(|| format!("'{}' is not a valid record id", id))?;
            engine.triage_violation(&record_id, resolution)?;
            println!("Record {} triaged as '{}'", id, resolution);
        }
    }
    Ok(())
}

fn print_audit_table(records: &[AuditRecord]) {
    if records.is_empty() {
        println!("No violations");
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        "Id", "Logged At (µs)", "Project", "Operation", "Resource", "Owner", "Actor", "Triage",
    ]);
    for record in records {
        table.add_row(vec![
            record.id_hex(),
            record.logged_at.to_string(),
            record.requesting_project.to_string(),
            record.operation.to_string(),
            record.resource.clone(),
            record
                .owning_project
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "<none>".to_string()),
            record.actor.clone(),
            record
                .triage
                .map(|r| r.to_string())
                .unwrap_or_else(|| "open".to_string()),
        ]);
    }
    println!("{table}");
}

fn run_bypass(engine: &IsolationEngine, cmd: BypassCommand) -> Result<(), Box<dyn Error>> {
    match cmd {
        BypassCommand::Activate { operator } => {
            engine.bypass().activate(&operator)?;
            println!("EMERGENCY BYPASS ACTIVE (operator: {})", operator);
            println!("Every row check will permit until deactivated.");
        }
        BypassCommand::Deactivate { operator } => {
            engine.bypass().deactivate(&operator)?;
            println!("Emergency bypass deactivated (operator: {})", operator);
        }
        BypassCommand::Status => {
            let status = engine.bypass().status();
            if status.active {
                println!(
                    "Bypass ACTIVE (operator: {}, since: {} µs)",
                    status.operator.as_deref().unwrap_or("<unknown>"),
                    status
                        .activated_at
                        .map(|ts| ts.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                );
            } else {
                println!("Bypass inactive");
            }
        }
    }
    Ok(())
}
