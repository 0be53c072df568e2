macro_rules! foo_bar { () => () }
//X
fn main() {
    foo_bar!();
    //^
}
