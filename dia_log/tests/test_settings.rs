use dia_log::{Settings, SettingsError, TemplateSource};
use glucose_forecast::{MealEvent, MealLedger, MealSource, MealType};
use glucose_template::utils::{generate_template, write_csv, GeneratorConfig};
use glucose_template::TEMPLATE_ROWS;
use std::fs::{self, File};
use tempfile::tempdir;

fn snack(id: &str, minute: usize) -> MealEvent {
    MealEvent::new(
        id,
        minute,
        MealType::Snack,
        150.0,
        20.0,
        3.0,
        6.0,
        1.0,
        MealSource::Manual,
    )
    .unwrap()
}

#[test]
fn test_missing_settings_file_uses_defaults() {
    let dir = tempdir().unwrap();
    let settings = Settings::load(&dir.path().join("dia_log.toml")).unwrap();
    assert_eq!(settings.template, TemplateSource::Generated { seed: 42 });
    assert_eq!(settings.forecast.window_size, 720);
}

#[test]
fn test_invalid_settings_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dia_log.toml");

    fs::write(&path, "[forecast]\nchart_stride = 0\n").unwrap();
    assert!(matches!(
        Settings::load(&path),
        Err(SettingsError::Forecast(_))
    ));

    fs::write(&path, "window_size = [").unwrap();
    assert!(matches!(Settings::load(&path), Err(SettingsError::Toml(_))));
}

#[test]
fn test_meal_ledger_round_trip() {
    let dir = tempdir().unwrap();
    let settings = Settings {
        meals_path: Some(dir.path().join("meals.json")),
        ..Default::default()
    };

    assert!(settings.load_meals().unwrap().is_empty());

    let ledger = MealLedger::from_events(vec![snack("a", 600), snack("b", 900)]).unwrap();
    settings.save_meals(&ledger).unwrap();

    let loaded = settings.load_meals().unwrap();
    assert_eq!(loaded, ledger);
}

#[test]
fn test_save_without_path_fails() {
    let settings = Settings::default();
    assert!(settings.save_meals(&MealLedger::new()).is_err());
}

#[tokio::test]
async fn test_template_sources() {
    let settings = Settings::default();
    let generated = settings.load_template().await.unwrap();
    assert_eq!(generated.len(), TEMPLATE_ROWS);

    let dir = tempdir().unwrap();
    let path = dir.path().join("template.csv");
    let store = generate_template(&GeneratorConfig {
        seed: 7,
        ..Default::default()
    })
    .unwrap();
    write_csv(&store, File::create(&path).unwrap()).unwrap();

    let settings = Settings {
        template: TemplateSource::File { path },
        ..Default::default()
    };
    let loaded = settings.load_template().await.unwrap();
    assert_eq!(loaded.rows(), store.rows());
}
