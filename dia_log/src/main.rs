use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveTime, Timelike};
use clap::{Args, Parser, Subcommand};
use dia_log::{parse_at, resolve_now, Settings, DEFAULT_SETTINGS_FILE};
use glucose_forecast::window::screen_sudden_drops;
use glucose_forecast::{
    GlucosePoint, HttpForecaster, MealEvent, MealFeature, MealSource, MealType,
    PredictionOrchestrator, WindowBuilder,
};
use glucose_template::utils::{generate_template, write_csv, GeneratorConfig};
use log::info;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dia-log", version, about = "Template-driven glucose windows and meal-isolated forecasts")]
struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone, Copy)]
struct NowArgs {
    /// Calendar date treated as "today" (defaults to the local date)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Wall-clock time as HH:MM (defaults to the local time)
    #[arg(long, value_parser = parse_at)]
    at: Option<NaiveTime>,
}

#[derive(Args, Debug, Clone)]
struct MealArgs {
    #[arg(long)]
    meal_type: MealType,
    #[arg(long, default_value_t = 0.0)]
    calories: f64,
    #[arg(long, default_value_t = 0.0)]
    carbs: f64,
    #[arg(long, default_value_t = 0.0)]
    protein: f64,
    #[arg(long, default_value_t = 0.0)]
    fat: f64,
    #[arg(long, default_value_t = 0.0)]
    fiber: f64,
    /// Fraction of the portion eaten
    #[arg(long, default_value_t = 1.0)]
    amount: f64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the trailing window ending now
    Window {
        #[command(flatten)]
        now: NowArgs,
        /// Override the configured window size
        #[arg(long)]
        size: Option<usize>,
    },
    /// Print today's 24h series
    Chart {
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Override the configured stride
        #[arg(long)]
        stride: Option<usize>,
        /// Emit all 1440 points instead of the downsampled series
        #[arg(long)]
        full: bool,
        /// Also list per-minute drops larger than this many mg/dL
        #[arg(long)]
        max_drop: Option<f64>,
    },
    /// Multi-horizon forecast with the meal effect separated
    Predict {
        #[command(flatten)]
        now: NowArgs,
    },
    /// Forecast the post-meal curve for a meal eaten now
    MealResponse {
        #[command(flatten)]
        now: NowArgs,
        #[command(flatten)]
        meal: MealArgs,
    },
    /// Append a meal to the ledger file
    LogMeal {
        #[arg(long)]
        id: String,
        #[arg(long, value_parser = parse_at)]
        at: NaiveTime,
        #[command(flatten)]
        meal: MealArgs,
    },
    /// Write a synthetic two-day template CSV
    GenerateTemplate {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

#[derive(Serialize)]
struct ChartOutput {
    date: NaiveDate,
    stride: usize,
    points: Vec<GlucosePoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    drops: Option<Vec<GlucosePoint>>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    let clock = Local::now().naive_local();

    match cli.command {
        Command::Window { now, size } => {
            let template = settings.load_template().await?;
            let ledger = settings.load_meals()?;
            let mut config = settings.forecast.window_config()?;
            if let Some(size) = size {
                config.window_size = size;
            }
            let window = WindowBuilder::new(&template, config)
                .build(resolve_now(now.date, now.at, clock), ledger.events())?;
            print_json(&window)?;
        }
        Command::Chart {
            date,
            stride,
            full,
            max_drop,
        } => {
            let template = settings.load_template().await?;
            let date = date.unwrap_or(clock.date());
            let builder = WindowBuilder::new(&template, settings.forecast.window_config()?);

            let stride = if full {
                1
            } else {
                stride.unwrap_or(settings.forecast.chart_stride)
            };
            let drops = match max_drop {
                Some(max_drop) => Some(screen_sudden_drops(&builder.full_day(date)?, max_drop)?),
                None => None,
            };
            print_json(&ChartOutput {
                date,
                stride,
                points: builder.full_day_downsampled(date, stride)?,
                drops,
            })?;
        }
        Command::Predict { now } => {
            let template = settings.load_template().await?;
            let ledger = settings.load_meals()?;
            let orchestrator = PredictionOrchestrator::new(HttpForecaster::new(&settings.forecast)?)
                .with_horizons(settings.forecast.horizons.clone())?;

            let results = orchestrator
                .predict_now(
                    Some(&template),
                    ledger.events(),
                    resolve_now(now.date, now.at, clock),
                    &settings.forecast.window_config()?,
                )
                .await
                .context("forecast failed")?;
            print_json(&results)?;
        }
        Command::MealResponse { now, meal } => {
            let template = settings.load_template().await?;
            let window = WindowBuilder::new(&template, settings.forecast.window_config()?)
                .build(resolve_now(now.date, now.at, clock), &[])?;
            let feature = MealFeature {
                meal_type: Some(meal.meal_type.to_string()),
                calories: meal.calories,
                carbs: meal.carbs,
                protein: meal.protein,
                fat: meal.fat,
                fiber: meal.fiber,
                amount_consumed: meal.amount,
            };

            let orchestrator = PredictionOrchestrator::new(HttpForecaster::new(&settings.forecast)?);
            let forecast = orchestrator
                .meal_response(&window, &feature)
                .await
                .context("meal response forecast failed")?;
            print_json(&forecast)?;
        }
        Command::LogMeal { id, at, meal } => {
            let mut ledger = settings.load_meals()?;
            let minute_of_day = (at.hour() * 60 + at.minute()) as usize;
            let event = MealEvent::new(
                id,
                minute_of_day,
                meal.meal_type,
                meal.calories,
                meal.carbs,
                meal.protein,
                meal.fat,
                meal.amount,
                MealSource::Manual,
            )?
            .with_fiber(meal.fiber)?;
            ledger.log(event)?;
            settings.save_meals(&ledger)?;
            info!("Ledger now holds {} meals", ledger.len());
        }
        Command::GenerateTemplate { out, seed } => {
            let store = generate_template(&GeneratorConfig {
                seed,
                ..Default::default()
            })?;
            let file = File::create(&out).with_context(|| format!("creating {}", out.display()))?;
            write_csv(&store, BufWriter::new(file))?;
            info!("Wrote {} rows to {}", store.len(), out.display());
        }
    }

    Ok(())
}
