use vergen_git2::{BuildBuilder, Emitter, Git2Builder};

fn main() -> anyhow::Result<()> {
    Emitter::default()
        .add_instructions(&BuildBuilder::default().build_timestamp(true).build()?)?
        .add_instructions(&Git2Builder::default().describe(true, true, None).build()?)?
        .emit()?;
    Ok(())
}
