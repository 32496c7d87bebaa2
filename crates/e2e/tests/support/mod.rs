//! A fake pet-adoption app served by the in-memory browser

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use uiflow_e2e::config::{RunSettings, Timeouts};
use uiflow_e2e::testing::{FakeApp, FakeDialog, FakeElement, FakePage};
use uiflow_e2e::ScenarioLoader;

pub const BASE_URL: &str = "http://localhost:3000";
pub const EMAIL: &str = "abcdefg@gmail.com";
pub const PASSWORD: &str = "123456789";
pub const EMPTY_STATE: &str = "Você ainda não cadastrou nenhum animal para adoção";
pub const DELETE_CONFIRM: &str = "Deseja excluir este animal?";
/// Class prefix of the pet cards rendered by the styled-components build
pub const PET_CARD: &str = "[class^=\"sc-d13fbcaf-0 icsOqW\"]";

/// Workspace root, where `scenarios/` and `fixtures/` live
pub fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

pub fn loader() -> ScenarioLoader {
    ScenarioLoader::new(workspace_root().join("fixtures"))
}

pub fn settings() -> RunSettings {
    RunSettings {
        base_url: Url::parse(BASE_URL).ok(),
        timeouts: Timeouts::default(),
        strict_dialogs: false,
    }
}

pub fn pet_app() -> FakeApp {
    FakeApp::new()
        .route("/login", login_page)
        .route("/area_logada/animais_disponiveis", |page| {
            // Rendered once the listing request returns
            page.add(
                FakeElement::new("h1")
                    .text("Animais disponíveis para adoção")
                    .appears_after(Duration::from_millis(200)),
            );
        })
        .route("/area_logada/meus_animais", my_pets_page)
        .route("/area_logada/disponibilizar_animal", register_page)
        .route("/area_logada/editar_dados", profile_page)
}

fn login_page(page: &mut FakePage) {
    page.add(FakeElement::input("input[name=\"email\"]"));
    page.add(FakeElement::input("input[type=\"password\"]"));
    page.add(FakeElement::new("button").text("Login").on_click(|page| {
        let email = page.value_of("input[name=\"email\"]").unwrap_or_default();
        let password = page.value_of("input[type=\"password\"]").unwrap_or_default();
        if email == EMAIL && password == PASSWORD {
            page.go("/area_logada/animais_disponiveis");
        } else {
            page.open_dialog(FakeDialog::alert("Email ou senha inválidos.").after(Duration::from_millis(300)));
        }
    }));
}

fn my_pets_page(page: &mut FakePage) {
    page.add(FakeElement::new("h1").text("Meus animais disponíveis para adoção"));
    let pets = page.store().lock().get("pets").cloned().unwrap_or_default();
    if pets.is_empty() {
        page.add(FakeElement::new("p").text(EMPTY_STATE));
    }
    for name in pets {
        let card = page.add(FakeElement::new("div.card").also(PET_CARD));
        page.add_within(&card, FakeElement::new("h3").text(&name));
        page.add_within(&card, FakeElement::new("button").text("Editar"));
        let (card_id, pet) = (card.clone(), name.clone());
        page.add_within(
            &card,
            FakeElement::new("button").text("Excluir").on_click(move |page| {
                let (card_id, pet) = (card_id.clone(), pet.clone());
                page.open_dialog(FakeDialog::confirm(DELETE_CONFIRM, move |page| {
                    if let Some(pets) = page.store().lock().get_mut("pets") {
                        pets.retain(|p| p != &pet);
                    }
                    // The card disappears once the delete request completes
                    page.remove_after(&card_id, Duration::from_millis(300));
                }));
            }),
        );
    }
}

fn combobox(page: &mut FakePage, id: &str, options: &'static [&'static str]) {
    let trigger_id = id.to_string();
    page.add(
        FakeElement::new("button[role=\"combobox\"]")
            .also(id)
            .text("Selecione")
            .on_click(move |page| {
                page.add(
                    FakeElement::new("[role=\"listbox\"]").appears_after(Duration::from_millis(100)),
                );
                for option in options {
                    let trigger = trigger_id.clone();
                    page.add(FakeElement::new("[role=\"option\"]").text(option).on_click(move |page| {
                        // The trigger is re-rendered with the chosen label
                        page.replace(&trigger, |el| el.text(option));
                        page.remove("[role=\"listbox\"]");
                        page.remove("[role=\"option\"]");
                    }));
                }
            }),
    );
}

fn register_page(page: &mut FakePage) {
    page.add(FakeElement::input("input[name=\"name\"]"));
    combobox(page, "#tipo", &["Cachorro", "Gato"]);
    combobox(page, "#genero", &["Macho", "Fêmea"]);
    page.add(FakeElement::input("input[name=\"race\"]"));
    page.add(FakeElement::input("textarea[name=\"description\"]"));
    page.add(FakeElement::new("input[type=\"file\"]").file_input());
    page.add(FakeElement::new("button").text("Cadastrar").on_click(|page| {
        let name = page.value_of("input[name=\"name\"]").unwrap_or_default();
        let kind = page.text_of("#tipo").unwrap_or_default();
        if name.is_empty() || kind == "Selecione" {
            page.add(FakeElement::new("p.erro").text("Preencha todos os campos obrigatórios"));
            return;
        }
        if !page.has_files("input[type=\"file\"]") {
            page.add(FakeElement::new("p.erro").text("A foto do animal é obrigatória"));
            return;
        }
        page.store().lock().entry("pets".to_string()).or_default().push(name);
        page.go("/area_logada/meus_animais");
    }));
}

fn profile_page(page: &mut FakePage) {
    let current = page
        .store()
        .lock()
        .get("profile_name")
        .and_then(|v| v.first().cloned())
        .unwrap_or_else(|| "Fulano".to_string());
    page.add(FakeElement::input("input[name=\"name\"]").value(&current));
    page.add(FakeElement::new("button").text("Salvar alterações").on_click(|page| {
        let name = page.value_of("input[name=\"name\"]").unwrap_or_default();
        page.store().lock().insert("profile_name".to_string(), vec![name]);
        page.go("/area_logada/editar_dados");
    }));
}
