fn main() {
    {
        macro_rules! foo_bar { () => () }
    }
    foo_bar!();
    //^ unresolved
}
