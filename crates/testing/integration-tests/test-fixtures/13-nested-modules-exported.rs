#[macro_use]
mod outer {
    #[macro_use]
    mod inner {
        macro_rules! foo_bar { () => () }
        //X
    }
}
fn main() {
    foo_bar!();
    //^
}
