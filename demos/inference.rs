//! Provides an example of how to use pearl to perform inference on a
//! Bayesian network.
//!
//! The network is the student example from Koller & Friedman,
//! "Probabilistic Graphical Models: Principles and Techniques", page 53.

use pearl as p;
use p::FactoredEngine;

fn main() -> p::Result<()> {
    env_logger::init();

    /////////////////////////////////////////////////////
    // Step 1: Build the model
    let model = build_model()?;

    let difficulty = model.lookup_variable("Difficulty").unwrap();
    let intelligence = model.lookup_variable("Intelligence").unwrap();
    let grade = model.lookup_variable("Grade").unwrap();
    let sat = model.lookup_variable("SAT").unwrap();
    let letter = model.lookup_variable("Letter").unwrap();

    /////////////////////////////////////////////////////
    // Step 2: Belief propagation for a single-variable query

    let mut bp = p::BeliefPropagation::new(&model);
    bp.set_query(&[grade])?;
    bp.run(false)?;
    bp.print_pd()?;

    println!();

    bp.set_query(&[difficulty])?;
    bp.set_evidence(&[(letter, "l0"), (sat, "s0")])?;
    bp.run(false)?;
    bp.print_pd()?;

    println!();

    /////////////////////////////////////////////////////
    // Step 3: Bucket elimination for a joint query

    let mut be = p::BucketElimination::new(&model);
    be.set_query(&[letter, sat])?;
    be.set_elimination_order(&[difficulty, intelligence, grade])?;
    be.run(false)?;
    be.print_pd()?;

    println!();

    /////////////////////////////////////////////////////
    // Step 4: Greedy bucket elimination picks the order itself

    let mut gbe = p::GreedyBucketElimination::new(&model);
    gbe.set_query(&[difficulty, intelligence])?;
    gbe.set_evidence(&[(letter, "l1"), (sat, "s1")])?;
    gbe.run(p::CostKind::WeightedMinFill, false)?;
    gbe.print_pd()?;

    Ok(())
}

fn build_model() -> p::Result<p::FactorGraph> {
    let mut builder = p::FactorGraphBuilder::new();

    let difficulty = builder.add_variable("Difficulty", &["d0", "d1"]);
    let intelligence = builder.add_variable("Intelligence", &["i0", "i1"]);
    let grade = builder.add_variable("Grade", &["g0", "g1", "g2"]);
    let sat = builder.add_variable("SAT", &["s0", "s1"]);
    let letter = builder.add_variable("Letter", &["l0", "l1"]);

    builder.add_factor("f_d", &[difficulty], |args| match args[0] {
        "d0" => 0.6,
        _ => 0.4,
    });
    builder.add_factor("f_i", &[intelligence], |args| match args[0] {
        "i0" => 0.7,
        _ => 0.3,
    });
    builder.add_factor(
        "f_dig",
        &[difficulty, intelligence, grade],
        |args| match (args[0], args[1], args[2]) {
            ("d0", "i0", "g0") => 0.30,
            ("d0", "i0", "g1") => 0.40,
            ("d0", "i0", "g2") => 0.30,
            ("d1", "i0", "g0") => 0.05,
            ("d1", "i0", "g1") => 0.25,
            ("d1", "i0", "g2") => 0.70,
            ("d0", "i1", "g0") => 0.90,
            ("d0", "i1", "g1") => 0.08,
            ("d0", "i1", "g2") => 0.02,
            ("d1", "i1", "g0") => 0.50,
            ("d1", "i1", "g1") => 0.30,
            _ => 0.20,
        },
    );
    builder.add_factor("f_is", &[intelligence, sat], |args| {
        match (args[0], args[1]) {
            ("i0", "s0") => 0.95,
            ("i0", "s1") => 0.05,
            ("i1", "s0") => 0.20,
            _ => 0.80,
        }
    });
    builder.add_factor("f_gl", &[grade, letter], |args| match (args[0], args[1]) {
        ("g0", "l0") => 0.10,
        ("g0", "l1") => 0.90,
        ("g1", "l0") => 0.40,
        ("g1", "l1") => 0.60,
        ("g2", "l0") => 0.99,
        _ => 0.01,
    });

    builder.build()
}
