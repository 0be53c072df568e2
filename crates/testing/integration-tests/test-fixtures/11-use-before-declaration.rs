fn main() {
    foo_bar!();
    //^ unresolved
}
macro_rules! foo_bar { () => () }
