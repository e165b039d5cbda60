/// A simulated device that advances in discrete steps.
#[allow(async_fn_in_trait)]
pub trait Simulateable {
    type Outcome;

    /// Runs one step of the simulation
    async fn tick(&mut self) -> Self::Outcome;
}
