// src/cli.rs
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(author, version, about = "Track workouts from the terminal", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    /// Print tables as CSV instead
    #[arg(long, global = true)]
    pub export_csv: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CategoryCli {
    WeightAndReps,
    Reps,
    Duration,
    DurationAndWeight,
    DistanceAndWeight,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitsCli {
    Metric,
    Imperial,
}

// Accepts plain seconds ("90") or minutes and seconds ("1:30")
pub fn parse_duration(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let invalid = || format!("Invalid duration '{s}'. Use seconds (90) or m:ss (1:30).");
    match s.split_once(':') {
        Some((minutes, seconds)) => {
            let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
            let seconds: u32 = seconds.parse().map_err(|_| invalid())?;
            if seconds >= 60 {
                return Err(invalid());
            }
            minutes
                .checked_mul(60)
                .and_then(|m| m.checked_add(seconds))
                .ok_or_else(invalid)
        }
        None => s.parse().map_err(|_| invalid()),
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the exercise catalog
    #[command(subcommand)]
    Exercise(ExerciseCommands),
    /// Run the workout in progress
    #[command(subcommand)]
    Workout(WorkoutCommands),
    /// Manage reusable workout plans
    #[command(subcommand)]
    Template(TemplateCommands),
    /// List finished workouts
    History {
        /// Show only the last N workouts
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Delete every finished workout
    HistoryClear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Show the path to the database file
    DbPath,
    /// Show the path to the config file
    ConfigPath,
    /// Set default units (Metric/Imperial)
    SetUnits {
        #[arg(value_enum)]
        units: UnitsCli,
    },
    GenerateCompletion {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ExerciseCommands {
    /// Define a new exercise
    Create {
        /// Name of the exercise (e.g., "Bench Press", "Plank")
        name: String,
        /// Which values each set records
        #[arg(short, long, value_enum)]
        category: CategoryCli,
    },
    /// List defined exercises
    List,
    Rename {
        name: String,
        new_name: String,
    },
    /// Delete an exercise and every record of it
    Delete {
        name: String,
    },
}

/// Values for one set. Weight and distance use the configured units.
#[derive(Args, Debug, Clone, Default)]
pub struct SetArgs {
    #[arg(short, long)]
    pub weight: Option<f64>,
    #[arg(short, long)]
    pub reps: Option<u32>,
    #[arg(long)]
    pub rpe: Option<f64>,
    /// Seconds (90) or m:ss (1:30)
    #[arg(short, long, value_parser = parse_duration)]
    pub duration: Option<u32>,
    #[arg(long)]
    pub distance: Option<f64>,
    /// Start from what was logged for this set last time
    #[arg(short, long)]
    pub previous: bool,
    /// Mark the set complete
    #[arg(short = 'c', long)]
    pub done: bool,
}

#[derive(Subcommand, Debug)]
pub enum WorkoutCommands {
    /// Start a new workout
    Start {
        /// Start from a template instead of an empty workout
        #[arg(short, long)]
        template: Option<String>,
    },
    /// Show the workout in progress
    Status,
    /// Add a catalog exercise to the workout
    AddExercise {
        exercise: String,
    },
    /// Remove an exercise by its position in the workout (starting at 1)
    RemoveExercise {
        position: usize,
    },
    /// Add an empty set to an exercise
    AddSet {
        position: usize,
    },
    /// Fill in a set. Without --set a new set is added.
    LogSet {
        position: usize,
        /// Set number (starting at 1)
        #[arg(short, long)]
        set: Option<usize>,
        #[command(flatten)]
        values: SetArgs,
    },
    /// Toggle whether a set is complete
    CompleteSet {
        position: usize,
        set: usize,
    },
    Rename {
        name: String,
    },
    /// Discard the workout in progress
    Cancel,
    /// Save completed sets and end the workout
    Finish,
}

#[derive(Subcommand, Debug)]
pub enum TemplateCommands {
    Create {
        name: String,
    },
    /// Add an exercise with blank planned sets
    AddExercise {
        template: String,
        exercise: String,
        #[arg(short, long, default_value_t = 3)]
        sets: usize,
    },
    List,
    Delete {
        name: String,
    },
    /// Start a workout from the template
    Start {
        name: String,
    },
}

// Function to parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
