//! Provides an example of how to use pearl to represent a Markov network
//! and inspect its structure.
//!
//! The network is the misconception example from Koller & Friedman,
//! "Probabilistic Graphical Models: Principles and Techniques", section 4.1.

use pearl as p;
use p::FactoredEngine;

fn main() -> p::Result<()> {
    env_logger::init();

    ///////////////////////////////////////////////////
    // Step 1: Define the variables and pairwise factors

    let mut builder = p::FactorGraphBuilder::new();
    let alice = builder.add_variable("Alice", &["a0", "a1"]);
    let bob = builder.add_variable("Bob", &["b0", "b1"]);
    let charles = builder.add_variable("Charles", &["c0", "c1"]);
    let debbie = builder.add_variable("Debbie", &["d0", "d1"]);

    builder.add_factor("f_ab", &[alice, bob], |args| match (args[0], args[1]) {
        ("a0", "b0") => 30.0,
        ("a0", "b1") => 5.0,
        ("a1", "b0") => 1.0,
        _ => 10.0,
    });
    builder.add_factor("f_bc", &[bob, charles], |args| match (args[0], args[1]) {
        ("b0", "c0") => 100.0,
        ("b0", "c1") => 1.0,
        ("b1", "c0") => 1.0,
        _ => 100.0,
    });
    builder.add_factor("f_cd", &[charles, debbie], |args| match (args[0], args[1]) {
        ("c0", "d0") => 1.0,
        ("c0", "d1") => 100.0,
        ("c1", "d0") => 100.0,
        _ => 1.0,
    });
    builder.add_factor("f_da", &[debbie, alice], |args| match (args[0], args[1]) {
        ("d0", "a0") => 100.0,
        ("d0", "a1") => 1.0,
        ("d1", "a0") => 1.0,
        _ => 100.0,
    });

    let model = builder.build()?;

    ///////////////////////////////////////////////////
    // Step 2: Inspect the structure

    for variable in model.variables() {
        println!(
            "{} over {:?}, {} factors",
            variable.name(),
            variable.domain(),
            variable.factors().len()
        );
    }
    for factor in model.factors() {
        let names: Vec<&str> = factor
            .variables()
            .iter()
            .map(|id| model.variable(*id).unwrap().name())
            .collect();
        println!("{}({})", factor.name(), names.join(", "));
    }

    ///////////////////////////////////////////////////
    // Step 3: The graph is loopy, so the elimination order matters; let
    // the greedy heuristic pick one and run bucket elimination

    let mut gbe = p::GreedyBucketElimination::new(&model);
    gbe.set_query(&[alice, bob])?;
    gbe.set_evidence(&[(charles, "c0"), (debbie, "d0")])?;
    gbe.run(p::CostKind::MinFill, false)?;
    gbe.print_pd()?;

    Ok(())
}
