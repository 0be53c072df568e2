macro_rules! foo_bar { () => () }
fn main() {
    foo_bar!(1);
    //^ unresolved
}
