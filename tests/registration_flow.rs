mod common;

use betline::ussd::session::{FlowScratch, MenuId, Step};
use common::{harness, Caller, JANE_PHONE};

const NEW_PHONE: &str = "254700111222";

#[tokio::test]
async fn matching_pins_create_account_and_sign_in() {
    let h = harness();
    let before = h.backend.user_count();
    let mut caller = Caller::new(&h, "reg-ok");

    caller.dial().await;
    let phone_prompt = caller.press("2").await;
    assert!(phone_prompt.starts_with("CON Register"), "unexpected: {}", phone_prompt);
    let name_prompt = caller.press(NEW_PHONE).await;
    assert!(name_prompt.contains("full name"), "unexpected: {}", name_prompt);
    let pin_prompt = caller.press("Amina Njeri").await;
    assert!(pin_prompt.contains("Create a 4-digit PIN"), "unexpected: {}", pin_prompt);
    let confirm_prompt = caller.press("1357").await;
    assert!(confirm_prompt.contains("Confirm your PIN"), "unexpected: {}", confirm_prompt);

    let reply = caller.press("1357").await;
    assert!(reply.starts_with("CON "), "unexpected: {}", reply);
    assert!(reply.contains("Registration successful."));
    assert!(reply.contains("Welcome Amina!"));

    assert_eq!(h.backend.user_count(), before + 1);
    let session = caller.session();
    assert_eq!(session.current_menu, MenuId::AccountMenu);
    assert!(session.user_id.is_some());
    assert!(session.flow.is_none());

    // The new account can log in from a different session.
    let mut again = Caller::new(&h, "reg-ok-login");
    again.dial().await;
    again.press("1").await;
    again.press(NEW_PHONE).await;
    let welcome = again.press("1357").await;
    assert!(welcome.contains("Welcome Amina!"), "unexpected: {}", welcome);
}

#[tokio::test]
async fn mismatched_confirmation_goes_back_to_pin_entry() {
    let h = harness();
    let before = h.backend.user_count();
    let mut caller = Caller::new(&h, "reg-mismatch");

    caller.dial().await;
    caller.press("2").await;
    caller.press(NEW_PHONE).await;
    caller.press("Amina Njeri").await;
    caller.press("1357").await;
    let reply = caller.press("2468").await;

    assert!(reply.contains("PINs do not match."), "unexpected: {}", reply);
    assert!(reply.contains("Create a 4-digit PIN"), "unexpected: {}", reply);
    assert_eq!(h.backend.user_count(), before);

    let session = caller.session();
    assert_eq!(session.current_menu, MenuId::Register);
    assert_eq!(session.step, Some(Step::Pin));
    match session.flow {
        Some(FlowScratch::Register(scratch)) => {
            assert_eq!(scratch.phone.as_deref(), Some(NEW_PHONE));
            assert_eq!(scratch.name.as_deref(), Some("Amina Njeri"));
            assert!(scratch.pin.is_none());
        }
        other => panic!("unexpected flow scratch: {:?}", other),
    }
}

#[tokio::test]
async fn existing_number_is_refused_at_phone_step() {
    let h = harness();
    let mut caller = Caller::new(&h, "reg-existing");
    caller.dial().await;
    caller.press("2").await;
    let reply = caller.press(JANE_PHONE).await;
    assert!(reply.contains("already registered"), "unexpected: {}", reply);
    assert_eq!(caller.session().step, Some(Step::Phone));
}

#[tokio::test]
async fn short_name_is_rejected() {
    let h = harness();
    let mut caller = Caller::new(&h, "reg-short-name");
    caller.dial().await;
    caller.press("2").await;
    caller.press(NEW_PHONE).await;
    let reply = caller.press("A").await;
    assert!(reply.starts_with("CON "));
    assert_eq!(caller.session().step, Some(Step::Name));
}

#[tokio::test]
async fn leaving_registration_discards_scratch() {
    let h = harness();
    let mut caller = Caller::new(&h, "reg-abandon");
    caller.dial().await;
    caller.press("2").await;
    caller.press(NEW_PHONE).await;
    caller.press("*").await;

    let session = caller.session();
    assert_eq!(session.current_menu, MenuId::MainMenu);
    assert!(session.flow.is_none());
}

#[tokio::test]
async fn retried_final_confirmation_creates_one_account() {
    let h = harness();
    let before = h.backend.user_count();
    let mut caller = Caller::new(&h, "reg-retry");

    caller.dial().await;
    caller.press("2").await;
    caller.press(NEW_PHONE).await;
    caller.press("Amina Njeri").await;
    caller.press("1357").await;
    let registered = caller.press("1357").await;
    assert!(registered.contains("Registration successful."), "unexpected: {}", registered);
    let version = caller.session().version;

    let retried = caller.resend().await;
    assert_eq!(retried, registered);
    assert_eq!(h.backend.user_count(), before + 1);
    assert_eq!(caller.session().version, version);
}
