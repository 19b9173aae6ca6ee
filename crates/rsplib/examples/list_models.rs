//! Print the supported receiver models and their LNA gain ladders.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p rsplib --example list_models
//! ```

fn main() {
    println!(
        "{:<8}  {:<16}  {:>3}  {:>6}  {:>8}  LNA states by band",
        "Model", "Family", "HDR", "Bias-T", "Antennas"
    );
    println!(
        "{:-<8}  {:-<16}  {:-<3}  {:-<6}  {:-<8}  {:-<20}",
        "", "", "", "", "", ""
    );
    for model in rsplib::supported_models() {
        let ladder: Vec<String> = model
            .lna_bands
            .iter()
            .map(|b| b.states.to_string())
            .collect();
        println!(
            "{:<8}  {:<16}  {:>3}  {:>6}  {:>8}  {}",
            model.name,
            model.family.to_string(),
            if model.has_hdr { "yes" } else { "no" },
            if model.has_bias_t { "yes" } else { "no" },
            model.antenna_ports,
            ladder.join(" / ")
        );
    }
}
