// Missing #[macro_use] here
mod a {
    macro_rules! foo_bar { () => () }
}
mod b {
    fn main() {
        foo_bar!();
        //^ unresolved
    }
}
