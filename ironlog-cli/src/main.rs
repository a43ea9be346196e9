//src/main.rs
mod cli;

use anyhow::{Context, Result};
use chrono::Local;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use std::io::{self, stdin, stdout, Write};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use ironlog_lib::{
    AppService, CancelOutcome, Category, CompletionOutcome, ExerciseDetails, SetInput, SetShape,
    SetValues, Units, WorkoutRecord, WorkoutTemplate,
};

fn main() -> Result<()> {
    // --- Check for completion generation request FIRST ---
    let cli_args = cli::parse_args();
    let export_csv = cli_args.export_csv;

    if let cli::Commands::GenerateCompletion { shell } = cli_args.command {
        let mut cmd = cli::build_cli_command();
        let bin_name = cmd.get_name().to_string();

        eprintln!("Generating completion script for {shell}...");
        clap_complete::generate(shell, &mut cmd, bin_name, &mut stdout());
        return Ok(());
    }

    init_logging();

    // Loads config, opens the store and resumes any workout in progress
    let mut service =
        AppService::initialize().context("Failed to initialize application service")?;
    debug!("Session restore: {:?}", service.session.restore_outcome());
    let units = service.config.units;
    let header_color = Color::Cyan;

    match cli_args.command {
        cli::Commands::GenerateCompletion { .. } => {
            unreachable!("Completion generation should have exited already");
        }

        // --- Exercise catalog ---
        cli::Commands::Exercise(command) => match command {
            cli::ExerciseCommands::Create { name, category } => {
                let details = service.create_exercise(&name, cli_category_to_category(category))?;
                println!(
                    "Successfully defined exercise: '{}' (Category: {})",
                    details.name, details.category
                );
            }
            cli::ExerciseCommands::List => {
                let exercises = service.list_exercises()?;
                if exercises.is_empty() {
                    println!("No exercises defined yet. Create one with 'ironlog exercise create'.");
                } else if export_csv {
                    print_exercise_csv(&exercises)?;
                } else {
                    print_exercise_table(&exercises, header_color);
                }
            }
            cli::ExerciseCommands::Rename { name, new_name } => {
                let details = service.rename_exercise(&name, &new_name)?;
                println!("Renamed exercise '{}' to '{}'.", name.trim(), details.name);
            }
            cli::ExerciseCommands::Delete { name } => {
                service.delete_exercise(&name)?;
                println!(
                    "Deleted exercise '{}' and every record of it.",
                    name.trim()
                );
            }
        },

        // --- Workout in progress ---
        cli::Commands::Workout(command) => match command {
            cli::WorkoutCommands::Start { template } => {
                let id = match template {
                    Some(name) => service.start_from_template(&name)?,
                    None => service.start_workout()?,
                };
                let name = service
                    .session
                    .current_workout()
                    .map_or("", |w| w.name.as_str());
                println!("Started workout '{name}' ({id}).");
            }
            cli::WorkoutCommands::Status => match service.session.current_workout() {
                Some(workout) => {
                    if export_csv {
                        print_workout_csv(std::slice::from_ref(workout), units)?;
                    } else {
                        print_status(&service, workout, header_color, units);
                    }
                }
                None => println!("No workout in progress. Start one with 'ironlog workout start'."),
            },
            cli::WorkoutCommands::AddExercise { exercise } => {
                service.add_exercise_to_workout(&exercise)?;
                let position = service
                    .session
                    .current_workout()
                    .map_or(0, |w| w.exercises.len());
                println!("Added '{}' as exercise #{position}.", exercise.trim());
            }
            cli::WorkoutCommands::RemoveExercise { position } => {
                let removed = service.remove_exercise_from_workout(position)?;
                let name = removed.details.as_ref().map_or("-", |d| d.name.as_str());
                println!(
                    "Removed exercise #{position} '{name}' ({} sets).",
                    removed.sets.len()
                );
            }
            cli::WorkoutCommands::AddSet { position } => {
                let number = service.add_set(position)?;
                println!("Added set {number} to exercise #{position}.");
            }
            cli::WorkoutCommands::LogSet {
                position,
                set,
                values,
            } => {
                let input = SetInput {
                    weight: values.weight,
                    reps: values.reps,
                    rpe: values.rpe,
                    duration_seconds: values.duration,
                    distance: values.distance,
                    from_previous: values.previous,
                    complete: values.done,
                };
                let (number, logged) = service.log_set(position, set, &input)?;
                println!(
                    "Set {number}: {}{}",
                    logged.values().summary(units),
                    if logged.is_complete() { " (done)" } else { "" }
                );
            }
            cli::WorkoutCommands::CompleteSet { position, set } => {
                let complete = service.toggle_set_complete(position, set)?;
                println!(
                    "Set {set} of exercise #{position} marked {}.",
                    if complete { "complete" } else { "incomplete" }
                );
            }
            cli::WorkoutCommands::Rename { name } => {
                service.rename_workout(&name)?;
                println!("Workout renamed to '{}'.", name.trim());
            }
            cli::WorkoutCommands::Cancel => match service.cancel_workout()? {
                CancelOutcome::Idle => println!("No workout in progress."),
                CancelOutcome::Discarded { exercises } => {
                    println!("Workout discarded ({exercises} exercises removed).");
                }
            },
            cli::WorkoutCommands::Finish => match service.finish_workout()? {
                CompletionOutcome::NothingToComplete => println!("No workout in progress."),
                CompletionOutcome::Discarded { pruned_sets } => println!(
                    "No completed sets, workout discarded ({pruned_sets} unfinished sets dropped)."
                ),
                CompletionOutcome::Saved {
                    exercises,
                    sets,
                    pruned_sets,
                    ..
                } => {
                    println!("Workout saved: {exercises} exercises, {sets} sets.");
                    if pruned_sets > 0 {
                        println!("Dropped {pruned_sets} unfinished sets.");
                    }
                }
            },
        },

        // --- Templates ---
        cli::Commands::Template(command) => match command {
            cli::TemplateCommands::Create { name } => {
                let template = service.create_template(&name)?;
                println!("Created template '{}'.", template.name);
            }
            cli::TemplateCommands::AddExercise {
                template,
                exercise,
                sets,
            } => {
                service.add_template_exercise(&template, &exercise, sets)?;
                println!(
                    "Added '{}' with {sets} sets to template '{}'.",
                    exercise.trim(),
                    template.trim()
                );
            }
            cli::TemplateCommands::List => {
                let templates = service.list_templates()?;
                if templates.is_empty() {
                    println!("No templates defined yet.");
                } else {
                    print_template_table(&templates, header_color);
                }
            }
            cli::TemplateCommands::Delete { name } => {
                service.delete_template(&name)?;
                println!("Deleted template '{}'.", name.trim());
            }
            cli::TemplateCommands::Start { name } => {
                let id = service.start_from_template(&name)?;
                println!("Started workout '{}' ({id}).", name.trim());
            }
        },

        // --- History ---
        cli::Commands::History { limit } => {
            let workouts = service.list_workouts(limit)?;
            if workouts.is_empty() {
                println!("No finished workouts yet.");
            } else if export_csv {
                print_workout_csv(&workouts, units)?;
            } else {
                print_history_table(&workouts, header_color);
            }
        }
        cli::Commands::HistoryClear { yes } => {
            let count = service.list_workouts(None)?.len();
            if count == 0 {
                println!("No finished workouts to delete.");
            } else if yes || confirm(&format!("Delete all {count} finished workouts?"))? {
                let removed = service.clear_history()?;
                println!("Deleted {removed} workouts.");
            } else {
                println!("Nothing deleted.");
            }
        }

        // --- Paths and config ---
        cli::Commands::DbPath => {
            println!("Database file is located at: {}", service.get_db_path().display());
        }
        cli::Commands::ConfigPath => {
            println!(
                "Config file is located at: {}",
                service.get_config_path().display()
            );
        }
        cli::Commands::SetUnits { units } => {
            let new_units = match units {
                cli::UnitsCli::Metric => Units::Metric,
                cli::UnitsCli::Imperial => Units::Imperial,
            };
            service
                .set_units(new_units)
                .context("Failed to save units to config")?;
            println!("Default units set to {new_units:?}.");
        }
    }

    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

const fn cli_category_to_category(category: cli::CategoryCli) -> Category {
    match category {
        cli::CategoryCli::WeightAndReps => Category::WeightAndReps,
        cli::CategoryCli::Reps => Category::Reps,
        cli::CategoryCli::Duration => Category::Duration,
        cli::CategoryCli::DurationAndWeight => Category::DurationAndWeight,
        cli::CategoryCli::DistanceAndWeight => Category::DistanceAndWeight,
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N]: ");
    stdout().flush()?;
    let mut answer = String::new();
    stdin()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn exercise_name(details: Option<&ExerciseDetails>) -> &str {
    details.map_or("(no exercise chosen)", |d| d.name.as_str())
}

/// Prints the workout in progress, one row per set.
fn print_status(service: &AppService, workout: &WorkoutRecord, header_color: Color, units: Units) {
    let elapsed = service
        .session
        .elapsed()
        .map_or_else(String::new, |d| {
            format!(" - {}:{:02} elapsed", d.num_hours(), d.num_minutes() % 60)
        });
    println!(
        "{} ({} of {} sets done){}",
        workout.name,
        workout.completed_set_count(),
        workout.set_count(),
        elapsed
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").fg(header_color),
            Cell::new("Exercise").fg(header_color),
            Cell::new("Set").fg(header_color),
            Cell::new("Values").fg(header_color),
            Cell::new("Last time").fg(header_color),
            Cell::new("Done").fg(header_color),
        ]);

    for (position, exercise) in workout.ordered_exercises().into_iter().enumerate() {
        let name = exercise_name(exercise.details.as_ref());
        if exercise.sets.is_empty() {
            table.add_row(vec![
                Cell::new(position + 1),
                Cell::new(name),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new(""),
            ]);
            continue;
        }
        for (idx, set) in exercise.sets.iter().enumerate() {
            let previous = exercise
                .id
                .and_then(|id| service.session.previous_set(&id, idx).ok().flatten())
                .map_or_else(|| "-".to_string(), |p| p.values().summary(units));
            let done = if set.is_complete() {
                Cell::new("✔").add_attribute(Attribute::Bold)
            } else {
                Cell::new("")
            };
            table.add_row(vec![
                Cell::new(if idx == 0 { (position + 1).to_string() } else { String::new() }),
                Cell::new(if idx == 0 { name } else { "" }),
                Cell::new(idx + 1),
                Cell::new(set.values().summary(units)),
                Cell::new(previous),
                done,
            ]);
        }
    }
    println!("{table}");
}

/// Prints exercise definitions in a formatted table.
fn print_exercise_table(exercises: &[ExerciseDetails], header_color: Color) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Name").fg(header_color),
            Cell::new("Category").fg(header_color),
            Cell::new("Fields (* required)").fg(header_color),
            Cell::new("Records").fg(header_color),
        ]);

    for exercise in exercises {
        table.add_row(vec![
            Cell::new(&exercise.name),
            Cell::new(exercise.category.to_string()),
            Cell::new(field_list(exercise.category)),
            Cell::new(if exercise.latest_completed_record.is_some() {
                "yes"
            } else {
                "-"
            }),
        ]);
    }
    println!("{table}");
}

fn field_list(category: Category) -> String {
    category
        .fields()
        .iter()
        .map(|field| {
            if category.requires(*field) {
                format!("{field}*")
            } else {
                field.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_exercise_csv(exercises: &[ExerciseDetails]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["Name", "Category"])?;
    for exercise in exercises {
        writer.write_record([exercise.name.as_str(), exercise.category.as_ref()])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_template_table(templates: &[WorkoutTemplate], header_color: Color) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Template").fg(header_color),
            Cell::new("Exercises").fg(header_color),
        ]);

    for template in templates {
        let exercises = template
            .ordered_exercises()
            .iter()
            .map(|e| format!("{} x{}", exercise_name(e.details.as_ref()), e.sets.len()))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![Cell::new(&template.name), Cell::new(exercises)]);
    }
    println!("{table}");
}

/// Prints finished workouts, most recent first.
fn print_history_table(workouts: &[WorkoutRecord], header_color: Color) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Date (Local)").fg(header_color),
            Cell::new("Workout").fg(header_color),
            Cell::new("Exercises").fg(header_color),
            Cell::new("Sets").fg(header_color),
        ]);

    for workout in workouts {
        let exercises = workout
            .ordered_exercises()
            .iter()
            .map(|e| exercise_name(e.details.as_ref()))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            Cell::new(
                workout
                    .created_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
                    .to_string(),
            ),
            Cell::new(&workout.name),
            Cell::new(exercises),
            Cell::new(workout.set_count()),
        ]);
    }
    println!("{table}");
}

fn format_or_empty(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| format!("{v:.2}"))
}

/// One CSV row per set.
fn print_workout_csv(workouts: &[WorkoutRecord], units: Units) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record([
        "Timestamp_Local",
        "Workout",
        "Exercise",
        "Category",
        "Set",
        format!("Weight_{}", units.weight_label()).as_str(),
        "Reps",
        "RPE",
        "Duration_s",
        format!("Distance_{}", units.distance_label()).as_str(),
        "Complete",
    ])?;

    for workout in workouts {
        let timestamp = workout.created_at.with_timezone(&Local).to_rfc3339();
        for exercise in workout.ordered_exercises() {
            for (idx, set) in exercise.sets.iter().enumerate() {
                let values: &SetValues = set.values();
                writer.write_record([
                    timestamp.clone(),
                    workout.name.clone(),
                    exercise_name(exercise.details.as_ref()).to_string(),
                    values.category().to_string(),
                    (idx + 1).to_string(),
                    format_or_empty(values.weight().map(|kg| units.weight_for_display(kg))),
                    values.reps_string(),
                    values.rpe_string(),
                    values
                        .duration_seconds()
                        .map_or_else(String::new, |s| s.to_string()),
                    format_or_empty(values.distance().map(|km| units.distance_for_display(km))),
                    set.is_complete().to_string(),
                ])?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}
