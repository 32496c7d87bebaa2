//! End-to-end flows of the pet-adoption app, run on the in-memory browser
//!
//! The scenario files under `scenarios/` are the ones a real run uses; here
//! they execute against a fake app with the same pages and behaviour.

mod support;

use std::sync::Arc;
use std::time::Duration;

use uiflow_e2e::spec::{Locator, Step};
use uiflow_e2e::testing::{FakeApp, FakeDialog, FakeElement};
use uiflow_e2e::{FailureKind, RunSettings, Scenario, ScenarioReport, SuiteRunner};

use support::{loader, pet_app, settings, workspace_root, DELETE_CONFIRM, PET_CARD};

fn scenario(file: &str, name: &str) -> Scenario {
    let path = workspace_root().join("scenarios").join(file);
    loader()
        .from_file(&path)
        .unwrap()
        .into_iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("no scenario '{}' in {}", name, file))
}

fn inline(yaml: &str) -> Scenario {
    loader().from_yaml(yaml, None).unwrap().remove(0)
}

async fn run_with(app: &Arc<FakeApp>, settings: RunSettings, scenario: &Scenario) -> ScenarioReport {
    SuiteRunner::new(app.clone(), settings).run_scenario(scenario).await
}

async fn run(app: &Arc<FakeApp>, scenario: &Scenario) -> ScenarioReport {
    run_with(app, settings(), scenario).await
}

/// Valid credentials land on the logged-in area and show the listing title
#[tokio::test(start_paused = true)]
async fn login_success_passes() {
    let app = Arc::new(pet_app());
    let scenario = scenario("login.yaml", "login redireciona para a area logada");

    let report = run(&app, &scenario).await;

    assert!(report.is_passed(), "{}", report.summary());
    assert_eq!(report.steps.len(), 6);
    assert!(report.steps[0].setup);
    assert!(report.steps.iter().skip(1).all(|s| !s.setup && s.success));
    assert_eq!(app.stats().closed(), 1);
}

/// Steps reach the browser exactly in declared order
#[tokio::test(start_paused = true)]
async fn steps_execute_in_declared_order() {
    let app = Arc::new(pet_app());
    let scenario = scenario("login.yaml", "login redireciona para a area logada");

    run(&app, &scenario).await;

    assert_eq!(
        app.commands(),
        vec![
            "navigate /login".to_string(),
            "type input[name=\"email\"] abcdefg@gmail.com".to_string(),
            "type input[type=\"password\"] 123456789".to_string(),
            "click button \"Login\"".to_string(),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn invalid_login_dialog_with_exact_text_passes() {
    let app = Arc::new(pet_app());
    let scenario = scenario("login.yaml", "login invalido exibe alerta");

    let report = run(&app, &scenario).await;

    assert!(report.is_passed(), "{}", report.summary());
    assert!(app
        .commands()
        .contains(&"accept dialog \"Email ou senha inválidos.\"".to_string()));
}

/// The mismatch is reported at the step that raised the dialog
#[tokio::test(start_paused = true)]
async fn invalid_login_dialog_mismatch_fails() {
    let app = Arc::new(pet_app());
    let scenario = inline(
        r#"
name: login invalido com texto errado
steps:
  - { action: navigate, url: /login }
  - { action: fill, target: 'input[name="email"]', value: usuario@invalido.com }
  - { action: fill, target: 'input[type="password"]', value: senhaErrada123 }
  - { action: expect_dialog, text: Credenciais inválidas }
  - { action: click, target: { css: button, text: Login } }
"#,
    );

    let report = run(&app, &scenario).await;

    assert!(!report.is_passed());
    assert_eq!(report.kind, Some(FailureKind::DialogMismatch));
    assert_eq!(report.failing_step, Some(4));
    assert_eq!(report.expected.as_deref(), Some("Credenciais inválidas"));
    assert_eq!(report.observed.as_deref(), Some("Email ou senha inválidos."));
    // The dialog was still answered
    assert!(app
        .commands()
        .iter()
        .any(|c| c.starts_with("accept dialog")));
}

/// A login page whose error alert opens `delay` after the click, as after a
/// slow request
fn slow_alert_app(delay: Duration) -> Arc<FakeApp> {
    Arc::new(FakeApp::new().route("/login", move |page| {
        page.add(FakeElement::new("h1").text("Entrar"));
        page.add(FakeElement::new("button").text("Login").on_click(move |page| {
            page.open_dialog(FakeDialog::alert("Erro").after(delay));
        }));
    }))
}

const LATE_ALERT: &str = r#"
name: alerta tardio
steps:
  - { action: navigate, url: /login }
  - { action: click, target: { css: button, text: Login } }
  - { action: wait, ms: 500 }
  - { action: assert_visible, target: text=Entrar }
"#;

/// A dialog opening while a later step polls is accepted, not a failure
#[tokio::test(start_paused = true)]
async fn late_unexpected_alert_is_accepted() {
    let app = slow_alert_app(Duration::from_millis(300));

    let report = run(&app, &inline(LATE_ALERT)).await;

    assert!(report.is_passed(), "{}", report.summary());
    assert!(app.commands().contains(&"accept dialog \"Erro\"".to_string()));
}

#[tokio::test(start_paused = true)]
async fn late_unexpected_alert_fails_in_strict_mode() {
    let app = slow_alert_app(Duration::from_millis(300));
    let strict = RunSettings {
        strict_dialogs: true,
        ..settings()
    };

    let report = run_with(&app, strict, &inline(LATE_ALERT)).await;

    assert_eq!(report.kind, Some(FailureKind::UnexpectedDialog));
    assert_eq!(report.failing_step, Some(3));
    assert_eq!(report.observed.as_deref(), Some("Erro"));
    assert!(app.commands().contains(&"dismiss dialog \"Erro\"".to_string()));
}

/// An expected dialog slower than the dialog timeout still meets its
/// expectation when a later step runs into it
#[tokio::test(start_paused = true)]
async fn expected_dialog_opening_late_is_matched() {
    let app = slow_alert_app(Duration::from_millis(2500));
    let expecting = |text: &str| {
        inline(&format!(
            r#"
name: alerta esperado tardio
steps:
  - {{ action: navigate, url: /login }}
  - {{ action: expect_dialog, text: {} }}
  - {{ action: click, target: {{ css: button, text: Login }} }}
  - {{ action: wait, ms: 1000 }}
  - {{ action: assert_visible, target: text=Entrar }}
"#,
            text
        ))
    };

    let report = run(&app, &expecting("Erro")).await;
    assert!(report.is_passed(), "{}", report.summary());

    let report = run(&slow_alert_app(Duration::from_millis(2500)), &expecting("Outro")).await;
    assert_eq!(report.kind, Some(FailureKind::DialogMismatch));
    assert_eq!(report.failing_step, Some(4));
    assert_eq!(report.observed.as_deref(), Some("Erro"));
}

/// An expectation nobody satisfied fails at the expect_dialog step
#[tokio::test(start_paused = true)]
async fn expected_dialog_that_never_opens_fails() {
    let app = Arc::new(pet_app());
    let scenario = inline(
        r#"
name: alerta esperado no login valido
steps:
  - { action: navigate, url: /login }
  - { action: fill, target: 'input[name="email"]', value: abcdefg@gmail.com }
  - { action: fill, target: 'input[type="password"]', value: "123456789" }
  - { action: expect_dialog, text: Email ou senha inválidos. }
  - { action: click, target: { css: button, text: Login } }
  - { action: assert_url_contains, fragment: /area_logada }
"#,
    );

    let report = run(&app, &scenario).await;

    assert_eq!(report.kind, Some(FailureKind::AssertionTimeout));
    assert_eq!(report.failing_step, Some(3));
    assert_eq!(report.observed.as_deref(), Some("no dialog"));
}

/// The combobox trigger is re-rendered on selection; the engine re-locates it
#[tokio::test(start_paused = true)]
async fn caramelo_registration_passes() {
    let app = Arc::new(pet_app());
    let scenario = scenario("pets.yaml", "cadastro completo de animal com foto");

    let report = run(&app, &scenario).await;

    assert!(report.is_passed(), "{}", report.summary());
    assert_eq!(
        app.store().lock().get("pets").cloned(),
        Some(vec!["Caramelo Totó".to_string()])
    );
    let commands = app.commands();
    let pick = commands
        .iter()
        .position(|c| c == "click [role=\"option\"] \"Cachorro\"")
        .unwrap();
    let attach = commands
        .iter()
        .position(|c| c == "attach input[type=\"file\"] caramelo.png")
        .unwrap();
    assert!(pick < attach);
}

#[tokio::test(start_paused = true)]
async fn registration_without_photo_fails() {
    let app = Arc::new(pet_app());
    let scenario = inline(
        r#"
name: cadastro sem foto
vars:
  pet: Caramelo Totó
steps:
  - { action: navigate, url: /login }
  - { action: fill, target: 'input[name="email"]', value: abcdefg@gmail.com }
  - { action: fill, target: 'input[type="password"]', value: "123456789" }
  - { action: click, target: { css: button, text: Login } }
  - { action: assert_url_contains, fragment: /area_logada }
  - { action: navigate, url: /area_logada/disponibilizar_animal }
  - { action: fill, target: 'input[name="name"]', value: "${pet}" }
  - action: select_option
    trigger: { css: 'button[role="combobox"]', index: 0 }
    option: Cachorro
  - action: select_option
    trigger: { css: 'button[role="combobox"]', index: 1 }
    option: Macho
  - { action: click, target: { css: button, text: Cadastrar } }
  - { action: assert_url_contains, fragment: /area_logada/meus_animais }
  - { action: assert_visible, target: "text=${pet}" }
"#,
    );

    let report = run(&app, &scenario).await;

    assert_eq!(report.kind, Some(FailureKind::AssertionTimeout));
    assert_eq!(report.failing_step, Some(10));
    assert!(report
        .observed
        .as_deref()
        .unwrap_or_default()
        .contains("/area_logada/disponibilizar_animal"));
    // Later steps never ran
    assert_eq!(report.steps.len(), 11);
    assert!(app.store().lock().get("pets").is_none());
}

#[tokio::test(start_paused = true)]
async fn empty_listing_shows_empty_state() {
    let app = Arc::new(pet_app());
    let scenario = scenario("pets.yaml", "meus animais sem cadastro mostra estado vazio");

    let report = run(&app, &scenario).await;

    assert!(report.is_passed(), "{}", report.summary());
}

/// The confirm dialog is accepted by default and the card goes away after
/// the delete request; the absence check waits for it
#[tokio::test(start_paused = true)]
async fn deletion_passes_after_asynchronous_removal() {
    let app = Arc::new(pet_app());
    let scenario = scenario("delete_pet.yaml", "exclusao de animal cadastrado");

    let report = run(&app, &scenario).await;

    assert!(report.is_passed(), "{}", report.summary());
    assert!(app
        .commands()
        .contains(&format!("accept dialog {:?}", DELETE_CONFIRM)));
    let absent = report.steps.last().unwrap();
    assert!(absent.label.starts_with("assert_absent"));
    assert!(absent.duration_ms >= 300, "absence passed after {} ms", absent.duration_ms);
}

#[tokio::test(start_paused = true)]
async fn deletion_confirm_fails_in_strict_mode() {
    let app = Arc::new(pet_app());
    let scenario = scenario("delete_pet.yaml", "exclusao de animal cadastrado");
    let strict = RunSettings {
        strict_dialogs: true,
        ..settings()
    };

    let report = run_with(&app, strict, &scenario).await;

    assert_eq!(report.kind, Some(FailureKind::UnexpectedDialog));
    assert_eq!(report.failing_step, Some(scenario.setup_len));
    assert_eq!(report.observed.as_deref(), Some(DELETE_CONFIRM));
}

/// Dismissing the confirm keeps the pet listed
#[tokio::test(start_paused = true)]
async fn deletion_dismissed_keeps_pet() {
    let app = Arc::new(pet_app());
    let mut scenario = scenario("delete_pet.yaml", "exclusao de animal cadastrado");
    scenario.steps.truncate(scenario.setup_len);
    scenario.steps.extend([
        Step::ExpectDialog {
            text: DELETE_CONFIRM.to_string(),
            dismiss: true,
        },
        Step::Click {
            target: Locator::css("button")
                .last()
                .within(Locator::css_with_text(PET_CARD, "Pet Para Excluir")),
            timeout_ms: None,
        },
        Step::Wait { ms: 500 },
        Step::AssertVisible {
            target: Locator::text("Pet Para Excluir"),
            timeout_ms: None,
        },
    ]);

    let report = run(&app, &scenario).await;

    assert!(report.is_passed(), "{}", report.summary());
    assert!(app
        .commands()
        .contains(&format!("dismiss dialog {:?}", DELETE_CONFIRM)));
    assert_eq!(
        app.store().lock().get("pets").cloned(),
        Some(vec!["Pet Para Excluir".to_string()])
    );
}

#[tokio::test(start_paused = true)]
async fn profile_edit_clears_then_types() {
    let app = Arc::new(pet_app());
    let scenario = scenario("profile.yaml", "edicao de dados pessoais");

    let report = run(&app, &scenario).await;

    assert!(report.is_passed(), "{}", report.summary());
    let commands = app.commands();
    let clear = commands
        .iter()
        .position(|c| c == "clear input[name=\"name\"]")
        .unwrap();
    assert_eq!(commands[clear + 1], "type input[name=\"name\"] Alterado");
}

/// Without clearing, typing appends to the pre-filled name and the value
/// assertion reports what it saw
#[tokio::test(start_paused = true)]
async fn profile_edit_without_clear_fails_on_value() {
    let app = Arc::new(pet_app());
    let mut scenario = scenario("profile.yaml", "edicao de dados pessoais");
    for step in &mut scenario.steps {
        if let Step::Fill { clear_first, .. } = step {
            *clear_first = false;
        }
    }

    let report = run(&app, &scenario).await;

    assert_eq!(report.kind, Some(FailureKind::AssertionTimeout));
    assert_eq!(report.failing_step, Some(8));
    assert_eq!(report.observed.as_deref(), Some("value \"FulanoAlterado\""));
}

/// Same scenario, independently reset app state, same outcome
#[tokio::test(start_paused = true)]
async fn runs_are_idempotent() {
    let registration = scenario("pets.yaml", "cadastro completo de animal com foto");
    let missing_photo = inline(
        r#"
name: cadastro incompleto
steps:
  - { action: navigate, url: /area_logada/disponibilizar_animal }
  - { action: click, target: { css: button, text: Cadastrar } }
  - { action: assert_url_contains, fragment: /meus_animais, timeout_ms: 500 }
"#,
    );

    for scenario in [&registration, &missing_photo] {
        let first = run(&Arc::new(pet_app()), scenario).await;
        let second = run(&Arc::new(pet_app()), scenario).await;
        assert_eq!(first.status, second.status);
        assert_eq!(first.failing_step, second.failing_step);
        assert_eq!(first.kind, second.kind);
    }
}
