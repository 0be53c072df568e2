// Missing #[macro_use] here
mod a {
    macro_rules! foo_bar { () => () }
}
fn main() {
    foo_bar!();
    //^ unresolved
}
