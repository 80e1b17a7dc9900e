fn main() {
  if let Err(err) = inference_deck_lib::run() {
    eprintln!("{}", err);
    if let Some(action) = err.suggested_action() {
      eprintln!("{}", action);
    }
    std::process::exit(1);
  }
}
